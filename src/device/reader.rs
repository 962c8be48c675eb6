//! Line reader with framing recovery.

use std::io::{self, Read};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{FRAME_LEN, LINE_LEN};
use crate::error::DeviceError;

/// Byte source the reader pulls from: a serial line, or a recorded capture.
pub trait SerialPort: Read {
    /// Wait up to `timeout` for input. Returns `false` when none arrived.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool>;
}

/// A recorded capture played back through the reader. Always readable;
/// end of input surfaces as [`DeviceError::Closed`].
#[derive(Debug)]
pub struct ReplayPort<R> {
    inner: R,
}

impl<R: Read> ReplayPort<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for ReplayPort<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> SerialPort for ReplayPort<R> {
    fn wait_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }
}

/// Framing state of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// The next read starts at a line boundary.
    Synced,
    /// Framing is lost; bytes are skipped up to the next blank line.
    Resyncing,
}

/// Reads fixed-length sample lines and recovers from framing loss.
#[derive(Debug)]
pub struct DeviceReader<P> {
    port: P,
    state: ReaderState,
    resyncs: u64,
    poll_interval: Duration,
}

impl<P: SerialPort> DeviceReader<P> {
    /// Wrap a port. The reader starts out resynchronizing.
    pub fn new(port: P) -> Self {
        Self {
            port,
            state: ReaderState::Resyncing,
            resyncs: 0,
            poll_interval: Duration::from_millis(200),
        }
    }

    /// How often a waiting resync checks for cancellation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Number of times framing was lost after the initial sync.
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Consume bytes one at a time through the next two consecutive `\n`.
    ///
    /// Waits as long as the device stays silent, checking `cancelled` every
    /// poll interval. Returns the number of bytes consumed, or `None` when
    /// cancelled first.
    pub fn resync(&mut self, cancelled: impl Fn() -> bool) -> Result<Option<usize>, DeviceError> {
        let mut consumed = 0;
        let mut after_newline = false;
        let mut byte = [0u8; 1];

        loop {
            if cancelled() {
                return Ok(None);
            }
            if !self.port.wait_readable(self.poll_interval)? {
                continue;
            }
            match self.port.read(&mut byte) {
                Ok(0) => return Err(DeviceError::Closed),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
            consumed += 1;

            if byte[0] == b'\n' {
                if after_newline {
                    self.state = ReaderState::Synced;
                    trace!(consumed, "device resynchronized");
                    return Ok(Some(consumed));
                }
                after_newline = true;
            } else {
                after_newline = false;
            }
        }
    }

    /// Read up to `max_len` bytes, giving up once `timeout` has elapsed in
    /// total. A trailing `\n\n` is stripped from the result.
    ///
    /// The result may be shorter than a line when the device goes quiet.
    pub fn read_line(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, DeviceError> {
        let deadline = Instant::now() + timeout;
        let mut line = vec![0u8; max_len];
        let mut filled = 0;

        while filled < max_len {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.port.wait_readable(remaining)? {
                break;
            }
            match self.port.read(&mut line[filled..]) {
                Ok(0) if filled == 0 => return Err(DeviceError::Closed),
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        line.truncate(filled);
        if line.ends_with(b"\n\n") {
            line.truncate(filled - 2);
        }
        Ok(line)
    }

    /// Produce the next full line, resynchronizing first if needed.
    ///
    /// Returns `None` when this round yielded no line: either the read came
    /// back with the wrong length (the reader is then resynchronizing) or
    /// `cancelled` fired during a resync.
    pub fn next_line(
        &mut self,
        timeout: Duration,
        cancelled: impl Fn() -> bool,
    ) -> Result<Option<Vec<u8>>, DeviceError> {
        if self.state == ReaderState::Resyncing && self.resync(&cancelled)?.is_none() {
            return Ok(None);
        }

        let line = self.read_line(FRAME_LEN, timeout)?;
        if line.len() != LINE_LEN {
            debug!(len = line.len(), "unexpected line length, resynchronizing");
            self.state = ReaderState::Resyncing;
            self.resyncs += 1;
            return Ok(None);
        }
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::line::tests::fixture;
    use std::collections::VecDeque;
    use std::io::Cursor;

    fn replay(bytes: Vec<u8>) -> DeviceReader<ReplayPort<Cursor<Vec<u8>>>> {
        DeviceReader::new(ReplayPort::new(Cursor::new(bytes)))
    }

    fn framed(line: &[u8]) -> Vec<u8> {
        let mut out = line.to_vec();
        out.extend_from_slice(b"\n\n");
        out
    }

    /// Delivers scripted chunks; `None` entries are silent polls.
    struct ScriptedPort {
        script: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.front_mut() {
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.script.pop_front();
                    }
                    Ok(n)
                }
                _ => Ok(0),
            }
        }
    }

    impl SerialPort for ScriptedPort {
        fn wait_readable(&mut self, _timeout: Duration) -> io::Result<bool> {
            match self.script.front() {
                Some(Some(_)) => Ok(true),
                Some(None) => {
                    self.script.pop_front();
                    Ok(false)
                }
                None => Ok(false),
            }
        }
    }

    #[test]
    fn test_resync_consumes_through_blank_line() {
        let line = fixture(1, [100, 250, 400, 530]);
        let prefix = b"garbage\nhalf a line\n\n".to_vec();
        let mut bytes = prefix.clone();
        bytes.extend(framed(&line));

        let mut reader = replay(bytes);
        assert_eq!(reader.state(), ReaderState::Resyncing);

        let consumed = reader.resync(|| false).unwrap();
        assert_eq!(consumed, Some(prefix.len()));
        assert_eq!(reader.state(), ReaderState::Synced);

        let read = reader.read_line(FRAME_LEN, Duration::from_secs(1)).unwrap();
        assert_eq!(read, line);
    }

    #[test]
    fn test_resync_ignores_single_newlines() {
        let mut reader = replay(b"a\nb\nc\n\nrest".to_vec());
        assert_eq!(reader.resync(|| false).unwrap(), Some(7));
    }

    #[test]
    fn test_resync_reports_closed_on_eof() {
        let mut reader = replay(b"no blank line\n".to_vec());
        assert!(matches!(reader.resync(|| false), Err(DeviceError::Closed)));
    }

    #[test]
    fn test_resync_can_be_cancelled() {
        let port = ScriptedPort {
            script: VecDeque::new(),
        };
        let mut reader = DeviceReader::new(port).with_poll_interval(Duration::from_millis(1));
        assert_eq!(reader.resync(|| true).unwrap(), None);
        assert_eq!(reader.state(), ReaderState::Resyncing);
    }

    #[test]
    fn test_next_line_recovers_from_short_line() {
        let good = fixture(2, [0, 200, 0, 200]);
        let mut bytes = b"\n\n".to_vec();
        bytes.extend_from_slice(b"truncated 12:00:00.1 1 2\n\n");
        // The 98-byte read swallows the start of the next line
        bytes.extend(framed(&fixture(1, [0, 100, 0, 100])));
        bytes.extend(framed(&good));

        let mut reader = replay(bytes);
        let timeout = Duration::from_secs(1);

        assert_eq!(reader.next_line(timeout, || false).unwrap(), None);
        assert_eq!(reader.state(), ReaderState::Resyncing);
        assert_eq!(reader.resync_count(), 1);

        assert_eq!(reader.next_line(timeout, || false).unwrap(), Some(good));
        assert_eq!(reader.state(), ReaderState::Synced);
    }

    #[test]
    fn read_line_returns_partial_data_on_silence() {
        let port = ScriptedPort {
            script: VecDeque::from([Some(b"0123456789".to_vec()), None]),
        };
        let mut reader = DeviceReader::new(port);

        let read = reader.read_line(FRAME_LEN, Duration::from_secs(1)).unwrap();
        assert_eq!(read, b"0123456789");
    }

    #[test]
    fn read_line_assembles_chunks() {
        let line = fixture(9, [5, 10, 15, 20]);
        let whole = framed(&line);
        let (a, b) = whole.split_at(40);
        let port = ScriptedPort {
            script: VecDeque::from([Some(a.to_vec()), Some(b.to_vec())]),
        };
        let mut reader = DeviceReader::new(port);

        let read = reader.read_line(FRAME_LEN, Duration::from_secs(1)).unwrap();
        assert_eq!(read, line);
    }

    #[test]
    fn read_line_at_end_of_input_is_closed() {
        let mut reader = replay(Vec::new());
        assert!(matches!(
            reader.read_line(FRAME_LEN, Duration::from_millis(10)),
            Err(DeviceError::Closed)
        ));
    }
}
