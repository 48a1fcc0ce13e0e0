//! TCP transport over the `embassy-net` stack.
//!
//! `embassy-net`'s socket is wrapped in [`TcpConnection`] so the core sees
//! the `embedded-io-async` traits it is written against. Socket buffers live
//! in the transport and are lent to one connection at a time.

use core::net::Ipv4Addr;

use brewnode_core::config::RetryPolicy;
use brewnode_core::{Transport, TransportError};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{ConnectError, TcpSocket};
use embassy_net::{IpAddress, Stack};
use embassy_time::Duration;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use log::{debug, warn};

const RX_BUFFER_SIZE: usize = 1024;
const TX_BUFFER_SIZE: usize = 1024;

pub struct EmbassyTransport {
    /// `None` when the node could not join a network this cycle.
    stack: Option<Stack<'static>>,
    /// Socket inactivity limit, a whole attempt long so the reporter's
    /// per-stage timeouts always elapse first.
    io_timeout: Duration,
    rx_buffer: [u8; RX_BUFFER_SIZE],
    tx_buffer: [u8; TX_BUFFER_SIZE],
}

impl EmbassyTransport {
    pub fn new(stack: Option<Stack<'static>>, retry: &RetryPolicy) -> Self {
        Self {
            stack,
            io_timeout: Duration::from_millis(retry.attempt_ms().into()),
            rx_buffer: [0; RX_BUFFER_SIZE],
            tx_buffer: [0; TX_BUFFER_SIZE],
        }
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, TransportError> {
    if let Ok(address) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(address));
    }

    let addresses = stack.dns_query(host, DnsQueryType::A).await.map_err(|e| {
        warn!("DNS lookup of {} failed: {:?}", host, e);
        TransportError::DnsFailed
    })?;

    addresses.first().copied().ok_or(TransportError::DnsFailed)
}

impl Transport for EmbassyTransport {
    type Connection<'c> = TcpConnection<'c>;

    async fn connect<'c>(
        &'c mut self,
        host: &str,
        port: u16,
    ) -> Result<TcpConnection<'c>, TransportError> {
        let Some(stack) = self.stack else {
            return Err(TransportError::Unreachable);
        };

        let address = resolve(stack, host).await?;
        debug!("Connecting to {}:{} ({})", host, port, address);

        let mut socket = TcpSocket::new(stack, &mut self.rx_buffer, &mut self.tx_buffer);
        socket.set_timeout(Some(self.io_timeout));
        socket.connect((address, port)).await.map_err(|e| match e {
            ConnectError::ConnectionReset => TransportError::Refused,
            ConnectError::TimedOut => TransportError::TimedOut,
            ConnectError::NoRoute => TransportError::Unreachable,
            _ => TransportError::Io,
        })?;

        Ok(TcpConnection { socket })
    }
}

pub struct TcpConnection<'c> {
    socket: TcpSocket<'c>,
}

impl Drop for TcpConnection<'_> {
    fn drop(&mut self) {
        self.socket.abort();
    }
}

impl ErrorType for TcpConnection<'_> {
    type Error = ErrorKind;
}

impl Read for TcpConnection<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}

impl Write for TcpConnection<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket
            .write(buf)
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .flush()
            .await
            .map_err(|_| ErrorKind::ConnectionReset)
    }
}
