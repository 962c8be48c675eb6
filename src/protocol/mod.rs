//! The LREQ/LRSP text protocol.
//!
//! - [`codec`]: encoders, the response decoder, and the frame length formula
//! - [`framer`]: peek-then-read message framing over a [`Connection`]
//! - [`transport`]: UDP and TCP connections

pub mod codec;
pub mod framer;
pub mod transport;

pub use codec::{
    decode_response, decode_response_body, encode_request, encode_response, frame_length,
};
pub use framer::{classify, Frame, MessageFramer};
pub use transport::{Connection, UdpConnection};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transport a server listens on and a client connects with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    #[serde(alias = "UDP")]
    Udp,
    #[serde(alias = "TCP")]
    Tcp,
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            other => Err(format!("unknown protocol {:?} (expected udp or tcp)", other)),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("udp"),
            Protocol::Tcp => f.write_str("tcp"),
        }
    }
}
