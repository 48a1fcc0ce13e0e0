//! Wire format understood by the collector.
//!
//! A report travels as a JSON object in the body of an HTTP/1.1 `POST` to the
//! collector's `add_data` endpoint. The acknowledgement is the HTTP status
//! line of the response; its body is ignored.

use alloc::format;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::config::CollectorConfig;
use crate::report::Report;

/// The collector answers a bad secret or an unknown sensor with one of these.
const AUTH_REJECTION_STATUSES: [u16; 3] = [401, 403, 404];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFault {
    #[error("report could not be serialized")]
    Encode,
    #[error("collector closed the connection without a response")]
    EmptyResponse,
    #[error("connection closed before the status line was complete")]
    ConnectionClosed,
    #[error("status line is not valid HTTP")]
    MalformedStatusLine,
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
}

/// How the collector answered a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
    Unexpected,
}

/// JSON body of one report.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WireRecord<'a> {
    pub sensor_id: u32,
    pub secret: &'a str,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub angle: f32,
    /// Always present; `null` when not measured. The collector requires the key.
    pub temperature: Option<f32>,
    pub battery: Option<f32>,
    /// Left out when unknown so the collector stamps the arrival time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl<'a> From<&Report<'a>> for WireRecord<'a> {
    fn from(report: &Report<'a>) -> Self {
        let vector = report.vector.vector;
        Self {
            sensor_id: report.identity.sensor_id,
            secret: report.identity.secret,
            x: vector.x,
            y: vector.y,
            z: vector.z,
            angle: report.angle_degrees,
            temperature: report.temperature_celsius,
            battery: report.battery_volts,
            timestamp: report.timestamp,
        }
    }
}

pub fn encode_body(report: &Report<'_>) -> Result<Vec<u8>, ProtocolFault> {
    serde_json::to_vec(&WireRecord::from(report)).map_err(|_| ProtocolFault::Encode)
}

/// Frame a JSON body as a complete HTTP/1.1 request.
pub fn encode_request(collector: &CollectorConfig<'_>, body: &[u8]) -> Vec<u8> {
    let head = format!(
        "POST {} HTTP/1.1\r\nHost: {}:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        collector.path,
        collector.host,
        collector.port,
        body.len()
    );

    let mut request = Vec::with_capacity(head.len() + body.len());
    request.extend_from_slice(head.as_bytes());
    request.extend_from_slice(body);
    request
}

/// Whether `response` already holds a full status line.
pub fn status_line_complete(response: &[u8]) -> bool {
    response.windows(2).any(|w| w == b"\r\n")
}

/// Extract the status code from `HTTP/1.x NNN Reason`.
pub fn parse_status_line(response: &[u8]) -> Result<u16, ProtocolFault> {
    if response.is_empty() {
        return Err(ProtocolFault::EmptyResponse);
    }

    let end = response
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(ProtocolFault::ConnectionClosed)?;
    let line = core::str::from_utf8(&response[..end]).map_err(|_| ProtocolFault::MalformedStatusLine)?;

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();

    if !version.starts_with("HTTP/1.") || code.len() != 3 {
        return Err(ProtocolFault::MalformedStatusLine);
    }

    code.parse::<u16>()
        .ok()
        .filter(|status| (100..600).contains(status))
        .ok_or(ProtocolFault::MalformedStatusLine)
}

pub fn classify(status: u16) -> Verdict {
    if (200..300).contains(&status) {
        Verdict::Accepted
    } else if AUTH_REJECTION_STATUSES.contains(&status) {
        Verdict::Rejected
    } else {
        Verdict::Unexpected
    }
}
