//! Load query client and its output formats.

use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::str::FromStr;
use std::time::Duration;

use les_types::{LoadInfo, MessageKind, Status};
use serde_json::json;

use crate::error::ProtocolError;
use crate::protocol::{
    decode_response_body, encode_request, Connection, MessageFramer, Protocol, UdpConnection,
};

/// A decoded response together with the bytes it arrived as.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResponse {
    pub raw: Vec<u8>,
    pub info: LoadInfo,
}

/// Sends one load request per query.
#[derive(Debug, Clone)]
pub struct LoadClient {
    protocol: Protocol,
    server: SocketAddr,
    timeout: Duration,
}

impl LoadClient {
    pub fn new(protocol: Protocol, server: SocketAddr) -> Self {
        Self {
            protocol,
            server,
            timeout: Duration::from_secs(2),
        }
    }

    /// Bound on connecting and on waiting for the response.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the server for its current load.
    pub fn query(&self) -> Result<LoadResponse, ProtocolError> {
        match self.protocol {
            Protocol::Udp => {
                let mut conn = UdpConnection::connect(self.server)?;
                self.exchange(&mut conn)
            }
            Protocol::Tcp => {
                let mut stream = TcpStream::connect_timeout(&self.server, self.timeout)?;
                self.exchange(&mut stream)
            }
        }
    }

    fn exchange<C: Connection>(&self, conn: &mut C) -> Result<LoadResponse, ProtocolError> {
        conn.send(&encode_request())?;
        let frame = MessageFramer::new(self.timeout).receive(conn)?;
        if frame.kind != MessageKind::LoadResponse {
            return Err(ProtocolError::UnknownTag(frame.kind.tag().to_string()));
        }
        let info = decode_response_body(frame.body())?;
        Ok(LoadResponse {
            raw: frame.bytes,
            info,
        })
    }
}

/// How `lec` prints a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// The response frame as received.
    #[default]
    Raw,
    /// A JSON object keyed by the response field names.
    Json,
    /// The load value alone.
    Short,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "json" => Ok(OutputFormat::Json),
            "short" => Ok(OutputFormat::Short),
            other => Err(format!("unknown format {:?} (expected raw, json or short)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Raw => f.write_str("raw"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Short => f.write_str("short"),
        }
    }
}

impl OutputFormat {
    /// Render a query result. Failures render as an unavailable server:
    /// status 400, or a load of `-1` in short form.
    pub fn render(self, result: Result<&LoadResponse, &ProtocolError>) -> String {
        match (self, result) {
            (OutputFormat::Raw, Ok(response)) => String::from_utf8_lossy(&response.raw).into_owned(),
            (OutputFormat::Raw, Err(_)) => {
                let body = format!("Status: {}\r\n", Status::DEVICE_UNAVAILABLE);
                format!("LRSP\r\nContent-Length: {}\r\n{}", body.len(), body)
            }
            (OutputFormat::Json, Ok(response)) => {
                let info = &response.info;
                json!({
                    "Status": info.status.code(),
                    "Delay-avg": info.weighted_avg,
                    "Delay-min": info.min,
                    "Delay-max": info.max,
                    "Samples": info.nsamples,
                    "Load-type": info.load_type,
                })
                .to_string()
            }
            (OutputFormat::Json, Err(_)) => {
                json!({ "Status": Status::DEVICE_UNAVAILABLE.code() }).to_string()
            }
            (OutputFormat::Short, Ok(response)) => format!("{:.3}", response.info.load_type),
            (OutputFormat::Short, Err(_)) => "-1".to_string(),
        }
    }
}
