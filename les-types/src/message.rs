//! Protocol message kinds and response status codes.

use core::fmt;

/// Kind of a protocol message, identified by its four-byte tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageKind {
    /// Load request (`LREQ`), always with content length 0.
    LoadRequest,
    /// Load response (`LRSP`), carrying the statistics fields.
    LoadResponse,
}

impl MessageKind {
    /// All message kinds, in tag-matching order.
    pub const ALL: [MessageKind; 2] = [MessageKind::LoadRequest, MessageKind::LoadResponse];

    /// The four-byte tag that starts a message of this kind.
    pub const fn tag(self) -> &'static str {
        match self {
            MessageKind::LoadRequest => "LREQ",
            MessageKind::LoadResponse => "LRSP",
        }
    }

    /// Match the first four bytes of a message against the known tags,
    /// ignoring ASCII case.
    pub fn from_tag(prefix: &[u8]) -> Option<Self> {
        let prefix = prefix.get(..4)?;
        Self::ALL
            .into_iter()
            .find(|kind| prefix.eq_ignore_ascii_case(kind.tag().as_bytes()))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Server/response status code carried in the `Status` field.
///
/// Any integer received on the wire is representable; the associated
/// constants name the codes a server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Status(pub u16);

impl Status {
    /// Statistics are live.
    pub const OK: Status = Status(200);
    /// The timing device is not (or no longer) delivering samples.
    pub const DEVICE_UNAVAILABLE: Status = Status(400);
    /// Unspecified server-side failure.
    pub const GENERAL_ERROR: Status = Status(444);

    /// Numeric value as sent on the wire.
    pub const fn code(self) -> u16 {
        self.0
    }

    /// True for [`Status::OK`].
    pub fn is_ok(self) -> bool {
        self == Status::OK
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::DEVICE_UNAVAILABLE
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Status(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tag_ignores_case() {
        assert_eq!(MessageKind::from_tag(b"LREQ"), Some(MessageKind::LoadRequest));
        assert_eq!(MessageKind::from_tag(b"lrsp\r\n"), Some(MessageKind::LoadResponse));
        assert_eq!(MessageKind::from_tag(b"LrEq"), Some(MessageKind::LoadRequest));
    }

    #[test]
    fn from_tag_rejects_unknown_and_short_prefixes() {
        assert_eq!(MessageKind::from_tag(b"STAT"), None);
        assert_eq!(MessageKind::from_tag(b"LRE"), None);
        assert_eq!(MessageKind::from_tag(b""), None);
    }

    #[test]
    fn status_codes() {
        assert_eq!(Status::OK.code(), 200);
        assert_eq!(Status::DEVICE_UNAVAILABLE.to_string(), "400");
        assert!(!Status::GENERAL_ERROR.is_ok());
        assert_eq!(Status::default(), Status::DEVICE_UNAVAILABLE);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn status_serializes_as_bare_integer() {
        let json = serde_json::to_string(&Status::OK).unwrap();
        assert_eq!(json, "200");
    }
}
