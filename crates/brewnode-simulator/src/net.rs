//! Host implementations of the core's network, delay and sleep seams.
//!
//! Everything here blocks the calling thread. The executor is
//! `embassy_futures::block_on`, so the futures handed to the core are always
//! ready when first polled; socket timeouts bound every wait instead.

use std::io::{self, Read as _, Write as _};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use brewnode_core::config::RetryPolicy;
use brewnode_core::{SleepControl, Transport, TransportError};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use log::{debug, info, warn};

/// TCP over the host's network stack.
pub struct StdTransport {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl StdTransport {
    /// Socket timeouts follow the node's retry policy.
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            connect_timeout: Duration::from_millis(policy.connect_timeout_ms.max(1).into()),
            io_timeout: Duration::from_millis(policy.ack_timeout_ms.max(1).into()),
        }
    }
}

fn transport_error(error: &io::Error) -> TransportError {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => TransportError::Refused,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::TimedOut,
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable => {
            TransportError::Unreachable
        }
        _ => TransportError::Io,
    }
}

fn io_error_kind(error: &io::Error) -> ErrorKind {
    match error.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::TimedOut,
        io::ErrorKind::ConnectionReset => ErrorKind::ConnectionReset,
        io::ErrorKind::ConnectionAborted => ErrorKind::ConnectionAborted,
        io::ErrorKind::BrokenPipe => ErrorKind::BrokenPipe,
        _ => ErrorKind::Other,
    }
}

impl Transport for StdTransport {
    type Connection<'c> = StdConnection;

    async fn connect<'c>(&'c mut self, host: &str, port: u16) -> Result<StdConnection, TransportError> {
        let addresses = (host, port).to_socket_addrs().map_err(|e| {
            warn!("Could not resolve {}: {}", host, e);
            TransportError::DnsFailed
        })?;

        let mut last_error = TransportError::DnsFailed;
        for address in addresses {
            match TcpStream::connect_timeout(&address, self.connect_timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(self.io_timeout))
                        .and_then(|()| stream.set_write_timeout(Some(self.io_timeout)))
                        .map_err(|e| transport_error(&e))?;
                    debug!("Connected to {}", address);
                    return Ok(StdConnection { stream });
                }
                Err(e) => {
                    debug!("Connecting to {} failed: {}", address, e);
                    last_error = transport_error(&e);
                }
            }
        }

        Err(last_error)
    }
}

pub struct StdConnection {
    stream: TcpStream,
}

impl ErrorType for StdConnection {
    type Error = ErrorKind;
}

impl Read for StdConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.stream.read(buf).map_err(|e| io_error_kind(&e))
    }
}

impl Write for StdConnection {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf).map_err(|e| io_error_kind(&e))
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|e| io_error_kind(&e))
    }
}

/// Wall-clock delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns.into()));
    }
}

/// Sleeps the thread for a scaled-down version of the node's deep sleep.
pub struct ThreadSleep {
    time_scale: f64,
}

impl ThreadSleep {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale: time_scale.max(0.0),
        }
    }

    pub fn scaled(&self, duration_us: u64) -> Duration {
        Duration::from_secs_f64(duration_us as f64 / 1_000_000.0 * self.time_scale)
    }
}

impl SleepControl for ThreadSleep {
    fn sleep_for(&mut self, duration_us: u64) {
        let scaled = self.scaled(duration_us);
        info!(
            "Deep sleep of {} s simulated as {:.3} s",
            duration_us / 1_000_000,
            scaled.as_secs_f64()
        );
        thread::sleep(scaled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::net::TcpListener;

    #[test]
    fn test_refused_connection() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut transport = StdTransport::new(&RetryPolicy::default());
        let result = block_on(transport.connect("127.0.0.1", port));
        assert!(matches!(result, Err(TransportError::Refused)));
    }

    #[test]
    fn test_unresolvable_host() {
        let mut transport = StdTransport::new(&RetryPolicy::default());
        let result = block_on(transport.connect("collector.invalid", 80));
        assert!(matches!(result, Err(TransportError::DnsFailed)));
    }

    #[test]
    fn test_read_times_out_as_timed_out_kind() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let policy = RetryPolicy {
            ack_timeout_ms: 50,
            ..RetryPolicy::default()
        };
        let mut transport = StdTransport::new(&policy);
        let mut connection = block_on(transport.connect("127.0.0.1", port)).unwrap();

        let mut buffer = [0u8; 8];
        assert_eq!(block_on(connection.read(&mut buffer)), Err(ErrorKind::TimedOut));
    }

    #[test]
    fn test_sleep_is_scaled() {
        let sleeper = ThreadSleep::new(0.5);
        assert_eq!(sleeper.scaled(600_000_000), Duration::from_secs(300));
        assert_eq!(ThreadSleep::new(-1.0).scaled(1_000_000), Duration::ZERO);
    }
}
