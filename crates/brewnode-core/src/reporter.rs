//! Delivery of reports to the collector with a bounded number of attempts.
//!
//! One attempt is: connect (bounded by the connect timeout), write the HTTP
//! request and read the status line (together bounded by the acknowledgement
//! timeout). Attempts are separated by a fixed pause, so the time spent in
//! [`Reporter::send`] never exceeds [`RetryPolicy::worst_case_ms`].

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{Error as _, ErrorKind, Read, Write};
use heapless::Vec;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::{CollectorConfig, RetryPolicy};
use crate::report::Report;
use crate::timeout::{Elapsed, with_timeout};
use crate::wire::{self, ProtocolFault, Verdict};

/// Bytes kept while waiting for the status line. Headers beyond it are
/// never needed.
const RESPONSE_CAPACITY: usize = 256;
const READ_CHUNK: usize = 64;

/// Failure of the network stack to hand out a connection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("collector host name could not be resolved")]
    DnsFailed,
    #[error("connection refused")]
    Refused,
    #[error("collector unreachable")]
    Unreachable,
    #[error("connection attempt timed out")]
    TimedOut,
    #[error("network I/O error")]
    Io,
}

impl TransportError {
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => Self::Unreachable,
            ErrorKind::NotFound => Self::DnsFailed,
            _ => Self::Io,
        }
    }
}

/// A network stack able to open stream connections to the collector.
///
/// The stack is assumed to be associated with a network already.
pub trait Transport {
    type Connection<'c>: Read + Write
    where
        Self: 'c;

    fn connect<'c>(
        &'c mut self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = Result<Self::Connection<'c>, TransportError>>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportError {
    #[error("could not reach collector: {0}")]
    Connect(TransportError),
    #[error("collector rejected the sensor identity (HTTP {status})")]
    Auth { status: u16 },
    #[error("no acknowledgement within {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },
    #[error("malformed acknowledgement: {0}")]
    Protocol(ProtocolFault),
}

impl ReportError {
    /// Rejections and protocol faults would repeat identically on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout { .. })
    }
}

/// Positive acknowledgement from the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub status: u16,
}

pub struct Reporter<'a, T, D> {
    transport: &'a mut T,
    delay: &'a mut D,
    collector: CollectorConfig<'a>,
    policy: RetryPolicy,
    attempts: u8,
}

impl<'a, T: Transport, D: DelayNs> Reporter<'a, T, D> {
    pub fn new(
        transport: &'a mut T,
        delay: &'a mut D,
        collector: CollectorConfig<'a>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            delay,
            collector,
            policy,
            attempts: 0,
        }
    }

    /// Attempts made by the last call to [`Reporter::send`].
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    pub async fn send(&mut self, report: &Report<'_>) -> Result<Ack, ReportError> {
        let body = wire::encode_body(report).map_err(ReportError::Protocol)?;
        let request = wire::encode_request(&self.collector, &body);
        let max_attempts = self.policy.max_attempts.max(1);

        self.attempts = 0;
        loop {
            self.attempts += 1;
            debug!(
                "Delivery attempt {}/{} to {}:{}",
                self.attempts, max_attempts, self.collector.host, self.collector.port
            );

            match self.attempt(&request).await {
                Ok(ack) => {
                    info!(
                        "Report from sensor {} acknowledged with HTTP {}",
                        report.sensor_id(),
                        ack.status
                    );
                    return Ok(ack);
                }
                Err(e) if e.is_retryable() && self.attempts < max_attempts => {
                    warn!("Attempt {} failed: {}, retrying", self.attempts, e);
                    self.delay.delay_ms(self.policy.retry_delay_ms).await;
                }
                Err(e) => {
                    error!("Report dropped after {} attempt(s): {}", self.attempts, e);
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&mut self, request: &[u8]) -> Result<Ack, ReportError> {
        let policy = self.policy;
        let host = self.collector.host;
        let port = self.collector.port;

        let connected = with_timeout(
            &mut *self.delay,
            policy.connect_timeout_ms,
            self.transport.connect(host, port),
        )
        .await;

        let mut connection = match connected {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(ReportError::Connect(e)),
            Err(Elapsed) => return Err(ReportError::Connect(TransportError::TimedOut)),
        };

        let exchanged = with_timeout(
            &mut *self.delay,
            policy.ack_timeout_ms,
            exchange(&mut connection, request, policy.ack_timeout_ms),
        )
        .await;

        match exchanged {
            Ok(result) => result,
            Err(Elapsed) => Err(ReportError::Timeout {
                timeout_ms: policy.ack_timeout_ms,
            }),
        }
    }
}

/// Write the request and read until the status line is complete.
async fn exchange<C: Read + Write>(
    connection: &mut C,
    request: &[u8],
    ack_timeout_ms: u32,
) -> Result<Ack, ReportError> {
    connection
        .write_all(request)
        .await
        .map_err(|e| ReportError::Connect(TransportError::from_kind(e.kind())))?;
    connection
        .flush()
        .await
        .map_err(|e| ReportError::Connect(TransportError::from_kind(e.kind())))?;

    let mut response: Vec<u8, RESPONSE_CAPACITY> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];

    while !wire::status_line_complete(&response) {
        let n = connection.read(&mut chunk).await.map_err(|e| match e.kind() {
            ErrorKind::TimedOut => ReportError::Timeout {
                timeout_ms: ack_timeout_ms,
            },
            _ => ReportError::Protocol(ProtocolFault::ConnectionClosed),
        })?;

        if n == 0 {
            break;
        }
        if response.extend_from_slice(&chunk[..n]).is_err() {
            return Err(ReportError::Protocol(ProtocolFault::MalformedStatusLine));
        }
    }

    let status = wire::parse_status_line(&response).map_err(ReportError::Protocol)?;

    match wire::classify(status) {
        Verdict::Accepted => Ok(Ack { status }),
        Verdict::Rejected => Err(ReportError::Auth { status }),
        Verdict::Unexpected => Err(ReportError::Protocol(ProtocolFault::UnexpectedStatus(status))),
    }
}
