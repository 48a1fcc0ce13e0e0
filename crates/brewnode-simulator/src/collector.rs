//! A minimal stand-in for the brew monitor's storage endpoint.
//!
//! Accepts `POST` on its configured path with a JSON datapoint, checks the
//! sensor identity against a fixed registry and keeps accepted datapoints in
//! memory. Status codes follow the real collector: 200 on success, 404 for an
//! unknown sensor or a wrong secret, 400 for anything it cannot parse. As on
//! the real collector, `temperature` and `battery` must be present, though
//! either may be `null`.

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

const MAX_BODY_BYTES: usize = 4096;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(2);

/// One stored measurement.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Datapoint {
    pub sensor_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub angle: f32,
    #[serde(deserialize_with = "nullable")]
    pub temperature: Option<f32>,
    #[serde(deserialize_with = "nullable")]
    pub battery: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// A required key whose value may be `null`.
fn nullable<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
    Option::deserialize(deserializer)
}

#[derive(Deserialize)]
struct Submission {
    secret: Option<String>,
    #[serde(flatten)]
    datapoint: Datapoint,
}

struct Response {
    status: u16,
    reason: &'static str,
    body: serde_json::Value,
}

impl Response {
    fn new(status: u16, reason: &'static str, body: serde_json::Value) -> Self {
        Self {
            status,
            reason,
            body,
        }
    }

    fn bad_request(message: String) -> Self {
        Self::new(400, "BAD REQUEST", json!({ "errors": [message] }))
    }

    fn not_found(message: String) -> Self {
        Self::new(404, "NOT FOUND", json!({ "errors": [message] }))
    }
}

struct Registry {
    secrets: HashMap<u32, String>,
    datapoints: Vec<Datapoint>,
}

impl Registry {
    fn add_data(&mut self, content_type: Option<&str>, body: &[u8]) -> Response {
        if content_type != Some("application/json") {
            return Response::bad_request("Content-Type header must be application/json".into());
        }

        let submission: Submission = match serde_json::from_slice(body) {
            Ok(submission) => submission,
            Err(e) => return Response::bad_request(format!("Failed to construct datapoint: {e}")),
        };

        let Some(secret) = submission.secret else {
            return Response::bad_request("Missing mandatory field 'secret'".into());
        };

        let mut datapoint = submission.datapoint;
        match self.secrets.get(&datapoint.sensor_id) {
            None => {
                return Response::not_found(format!("Did not find the sensor {}", datapoint.sensor_id));
            }
            Some(expected) if *expected != secret => {
                return Response::not_found("Invalid sensor identification".into());
            }
            Some(_) => {}
        }

        if datapoint.timestamp.is_none() {
            datapoint.timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_secs());
        }

        info!(
            "Collector stored datapoint from sensor {}: angle {:.2}°",
            datapoint.sensor_id, datapoint.angle
        );
        let created = json!({ "created": [&datapoint] });
        self.datapoints.push(datapoint);

        Response::new(200, "OK", created)
    }
}

/// Handle to a collector running on a background thread.
///
/// The thread lives as long as the process.
pub struct FakeCollector {
    address: SocketAddr,
    path: String,
    registry: Arc<Mutex<Registry>>,
}

impl FakeCollector {
    /// Listen on an ephemeral loopback port, serving `path`, with the given
    /// sensors registered.
    pub fn spawn(path: &str, sensors: &[(u32, &str)]) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?;

        let registry = Arc::new(Mutex::new(Registry {
            secrets: sensors
                .iter()
                .map(|(id, secret)| (*id, (*secret).to_owned()))
                .collect(),
            datapoints: Vec::new(),
        }));

        let shared = Arc::clone(&registry);
        let route = path.to_owned();
        thread::Builder::new()
            .name("fake-collector".into())
            .spawn(move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            if let Err(e) = serve(stream, &route, &shared) {
                                warn!("Collector connection failed: {}", e);
                            }
                        }
                        Err(e) => warn!("Collector accept failed: {}", e),
                    }
                }
            })?;

        info!("Fake collector listening on {}{}", address, path);
        Ok(Self {
            address,
            path: path.to_owned(),
            registry,
        })
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn datapoints(&self) -> Vec<Datapoint> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .datapoints
            .clone()
    }
}

fn serve(stream: TcpStream, route: &str, registry: &Mutex<Registry>) -> io::Result<()> {
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);

    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let path = parts.next().unwrap_or_default().to_owned();

    let mut content_type = None;
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_owned());
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            }
        }
    }

    debug!("Collector request: {} {} ({} bytes)", method, path, content_length);

    let response = if method != "POST" || path != route {
        Response::not_found(format!("No route for {method} {path}"))
    } else if content_length > MAX_BODY_BYTES {
        Response::bad_request("Request body too large".into())
    } else {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body)?;
        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_data(content_type.as_deref(), &body)
    };

    write_response(stream, &response)
}

fn write_response(mut stream: TcpStream, response: &Response) -> io::Result<()> {
    let body = response.body.to_string();
    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        response.reason,
        body.len(),
        body
    )?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brewnode_core::config::DEFAULT_COLLECTOR_PATH;

    fn spawn() -> FakeCollector {
        FakeCollector::spawn(DEFAULT_COLLECTOR_PATH, &[(1, "abc")]).unwrap()
    }

    fn post(port: u16, path: &str, content_type: &str, body: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        write!(
            stream,
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    fn status_of(response: &str) -> &str {
        response.split_whitespace().nth(1).unwrap()
    }

    #[test]
    fn test_accepts_registered_sensor() {
        let collector = spawn();
        let response = post(
            collector.port(),
            DEFAULT_COLLECTOR_PATH,
            "application/json",
            r#"{"sensor_id":1,"secret":"abc","x":0.1,"y":0.2,"z":0.9,"angle":52.5,"temperature":19.25,"battery":null}"#,
        );

        assert_eq!(status_of(&response), "200");
        let stored = collector.datapoints();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sensor_id, 1);
        assert_eq!(stored[0].angle, 52.5);
        assert_eq!((stored[0].x, stored[0].y, stored[0].z), (0.1, 0.2, 0.9));
        assert_eq!(stored[0].temperature, Some(19.25));
        assert_eq!(stored[0].battery, None);
        assert!(stored[0].timestamp.is_some());
    }

    #[test]
    fn test_rejects_identity() {
        let collector = spawn();

        let wrong_secret = post(
            collector.port(),
            DEFAULT_COLLECTOR_PATH,
            "application/json",
            r#"{"sensor_id":1,"secret":"nope","x":0,"y":0,"z":1,"angle":10.0,"temperature":null,"battery":null}"#,
        );
        assert_eq!(status_of(&wrong_secret), "404");
        assert!(wrong_secret.contains("Invalid sensor identification"));

        let unknown = post(
            collector.port(),
            DEFAULT_COLLECTOR_PATH,
            "application/json",
            r#"{"sensor_id":9,"secret":"abc","x":0,"y":0,"z":1,"angle":10.0,"temperature":null,"battery":null}"#,
        );
        assert_eq!(status_of(&unknown), "404");
        assert!(collector.datapoints().is_empty());
    }

    #[test]
    fn test_rejects_malformed_requests() {
        let collector = spawn();
        let port = collector.port();

        let not_json = post(port, DEFAULT_COLLECTOR_PATH, "text/plain", "angle=10");
        assert_eq!(status_of(&not_json), "400");

        let missing_secret = post(port, DEFAULT_COLLECTOR_PATH, "application/json", r#"{"sensor_id":1,"x":0,"y":0,"z":1,"angle":1.0,"temperature":null,"battery":null}"#);
        assert_eq!(status_of(&missing_secret), "400");

        let garbage = post(port, DEFAULT_COLLECTOR_PATH, "application/json", "{not json");
        assert_eq!(status_of(&garbage), "400");

        assert!(collector.datapoints().is_empty());
    }

    #[test]
    fn test_requires_measurement_keys() {
        let collector = spawn();
        let port = collector.port();

        let no_battery = post(
            port,
            DEFAULT_COLLECTOR_PATH,
            "application/json",
            r#"{"sensor_id":1,"secret":"abc","x":0,"y":0,"z":1,"angle":1.0,"temperature":20.0}"#,
        );
        assert_eq!(status_of(&no_battery), "400");

        let no_temperature = post(
            port,
            DEFAULT_COLLECTOR_PATH,
            "application/json",
            r#"{"sensor_id":1,"secret":"abc","x":0,"y":0,"z":1,"angle":1.0,"battery":3.9}"#,
        );
        assert_eq!(status_of(&no_temperature), "400");

        assert!(collector.datapoints().is_empty());
    }

    #[test]
    fn test_serves_configured_path_only() {
        let collector = FakeCollector::spawn("/api/tilt", &[(1, "abc")]).unwrap();
        assert_eq!(collector.path(), "/api/tilt");
        let body = r#"{"sensor_id":1,"secret":"abc","x":0,"y":0,"z":1,"angle":0.0,"temperature":null,"battery":null}"#;

        let default_path = post(collector.port(), DEFAULT_COLLECTOR_PATH, "application/json", body);
        assert_eq!(status_of(&default_path), "404");

        let custom = post(collector.port(), "/api/tilt", "application/json", body);
        assert_eq!(status_of(&custom), "200");
        assert_eq!(collector.datapoints().len(), 1);
    }
}
