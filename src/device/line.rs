//! Tokenizer for device sample lines.
//!
//! A line is `SEQ HH:MM:SS.FRAC T1 T2 T3 T4`, space padded to
//! [`LINE_LEN`](super::LINE_LEN) bytes. The leading fields are validated but
//! otherwise unused.

use std::str;

use les_types::Sample;

use super::LINE_LEN;
use crate::error::LineError;

/// One parsed device line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLine {
    pub sequence: i64,
    pub t1: i64,
    pub t2: i64,
    pub t3: i64,
    pub t4: i64,
}

impl DeviceLine {
    /// Parse a line of exactly [`LINE_LEN`](super::LINE_LEN) bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, LineError> {
        if bytes.len() != LINE_LEN {
            return Err(LineError::Length(bytes.len()));
        }
        let text = str::from_utf8(bytes).map_err(|_| LineError::InvalidField {
            field: "line",
            value: String::from_utf8_lossy(bytes).into_owned(),
        })?;

        let mut fields = text.split_ascii_whitespace();
        let sequence = integer(&mut fields, "sequence")?;

        let clock = fields.next().ok_or(LineError::MissingField("time"))?;
        parse_clock(clock)?;

        Ok(Self {
            sequence,
            t1: integer(&mut fields, "t1")?,
            t2: integer(&mut fields, "t2")?,
            t3: integer(&mut fields, "t3")?,
            t4: integer(&mut fields, "t4")?,
        })
    }

    /// One-way delay: `((t2 - t1) + (t4 - t3)) / 2`.
    pub fn delay(&self) -> Result<Sample, LineError> {
        let forward = self.t2.checked_sub(self.t1).ok_or(LineError::Overflow)?;
        let backward = self.t4.checked_sub(self.t3).ok_or(LineError::Overflow)?;
        let total = forward.checked_add(backward).ok_or(LineError::Overflow)?;
        Ok(total / 2)
    }
}

/// Delay of a raw line in one step.
pub fn extract_sample(bytes: &[u8]) -> Result<Sample, LineError> {
    DeviceLine::parse(bytes)?.delay()
}

/// True when `line` repeats the T3/T4 pair of `prev`, which marks a SYNC
/// duplicate rather than a fresh delay measurement.
pub fn is_sync_duplicate(prev: Option<&DeviceLine>, line: &DeviceLine) -> bool {
    prev.is_some_and(|prev| prev.t3 == line.t3 && prev.t4 == line.t4)
}

fn integer<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<i64, LineError> {
    let value = fields.next().ok_or(LineError::MissingField(name))?;
    value.parse().map_err(|_| LineError::InvalidField {
        field: name,
        value: value.to_string(),
    })
}

fn parse_clock(clock: &str) -> Result<(), LineError> {
    let invalid = || LineError::InvalidField {
        field: "time",
        value: clock.to_string(),
    };
    let (hms, frac) = clock.split_once('.').ok_or_else(invalid)?;
    let mut parts = hms.split(':');
    for _ in 0..3 {
        let part = parts.next().ok_or_else(invalid)?;
        part.parse::<u32>().map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    frac.parse::<u64>().map_err(|_| invalid())?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A well-formed, space padded device line.
    pub(crate) fn fixture(seq: i64, t: [i64; 4]) -> Vec<u8> {
        let text = format!(
            "{} 10:31:07.482113 {} {} {} {}",
            seq, t[0], t[1], t[2], t[3]
        );
        format!("{:<width$}", text, width = LINE_LEN).into_bytes()
    }

    #[test]
    fn test_parse_and_delay() {
        let bytes = fixture(7, [1_000_000, 1_150_000, 2_000_000, 2_130_000]);
        assert_eq!(bytes.len(), LINE_LEN);

        let line = DeviceLine::parse(&bytes).unwrap();
        assert_eq!(line.sequence, 7);
        assert_eq!(line.t4, 2_130_000);
        assert_eq!(line.delay().unwrap(), 140_000);
        assert_eq!(extract_sample(&bytes).unwrap(), 140_000);
    }

    #[test]
    fn test_negative_timestamps_and_truncation() {
        let bytes = fixture(1, [-10, -5, 100, 102]);
        // (5 + 2) / 2 truncates toward zero
        assert_eq!(extract_sample(&bytes).unwrap(), 3);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert_eq!(
            DeviceLine::parse(b"1 00:00:00.0 1 2 3 4"),
            Err(LineError::Length(20))
        );
    }

    #[test]
    fn test_rejects_malformed_fields() {
        let line = format!("{:<96}", "1 10:31:07.5 1 2 three 4");
        assert_eq!(
            DeviceLine::parse(line.as_bytes()),
            Err(LineError::InvalidField {
                field: "t3",
                value: "three".to_string()
            })
        );

        let line = format!("{:<96}", "1 10:31 1 2 3 4");
        assert!(matches!(
            DeviceLine::parse(line.as_bytes()),
            Err(LineError::InvalidField { field: "time", .. })
        ));

        let line = format!("{:<96}", "1 10:31:07.5 1 2 3");
        assert_eq!(
            DeviceLine::parse(line.as_bytes()),
            Err(LineError::MissingField("t4"))
        );
    }

    #[test]
    fn test_delay_overflow_is_an_error() {
        let line = DeviceLine {
            sequence: 0,
            t1: i64::MIN,
            t2: i64::MAX,
            t3: 0,
            t4: 0,
        };
        assert_eq!(line.delay(), Err(LineError::Overflow));
    }

    #[test]
    fn sync_duplicates_match_on_t3_t4() {
        let a = DeviceLine::parse(&fixture(1, [10, 20, 30, 40])).unwrap();
        let b = DeviceLine::parse(&fixture(2, [11, 21, 30, 40])).unwrap();
        let c = DeviceLine::parse(&fixture(3, [11, 21, 31, 40])).unwrap();

        assert!(is_sync_duplicate(Some(&a), &b));
        assert!(!is_sync_duplicate(Some(&b), &c));
        assert!(!is_sync_duplicate(None, &a));
    }
}
