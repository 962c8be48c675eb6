//! Serial line access through termios.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::termios::{
    cfsetspeed, tcflush, tcgetattr, tcsetattr, BaudRate, ControlFlags, FlushArg, InputFlags,
    SetArg, Termios,
};
use tracing::{debug, warn};

use super::reader::SerialPort;
use crate::error::DeviceError;

nix::ioctl_none_bad!(set_exclusive, nix::libc::TIOCEXCL);

/// Baud rates the timing device can be configured for.
pub const SUPPORTED_SPEEDS: [u32; 5] = [9600, 19200, 38400, 57600, 115200];

fn baud_rate(speed: u32) -> Option<BaudRate> {
    match speed {
        9600 => Some(BaudRate::B9600),
        19200 => Some(BaudRate::B19200),
        38400 => Some(BaudRate::B38400),
        57600 => Some(BaudRate::B57600),
        115200 => Some(BaudRate::B115200),
        _ => None,
    }
}

/// An open, configured serial device. The original line settings are
/// restored on drop.
#[derive(Debug)]
pub struct TtyPort {
    file: File,
    path: PathBuf,
    saved: Termios,
}

impl TtyPort {
    /// Open `path` read-only, without becoming its controlling terminal, and
    /// configure it for `speed` baud with no flow control.
    pub fn open(path: impl AsRef<Path>, speed: u32) -> Result<Self, DeviceError> {
        let path = path.as_ref().to_path_buf();
        let attributes = |source| DeviceError::Attributes {
            path: path.clone(),
            source,
        };

        let rate = baud_rate(speed).ok_or_else(|| attributes(nix::Error::EINVAL))?;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NOCTTY)
            .open(&path)
            .map_err(|source| DeviceError::Open {
                path: path.clone(),
                source,
            })?;

        let saved = tcgetattr(file.as_fd()).map_err(attributes)?;

        // Exclusive mode is best effort.
        // SAFETY: TIOCEXCL takes no argument and `file` is open for the call.
        if let Err(e) = unsafe { set_exclusive(file.as_raw_fd()) } {
            warn!(path = %path.display(), error = %e, "could not get exclusive access to device");
        }

        let mut termios = saved.clone();
        cfsetspeed(&mut termios, rate).map_err(attributes)?;
        termios.control_flags.insert(ControlFlags::CREAD);
        termios.control_flags.remove(ControlFlags::CRTSCTS);
        termios.input_flags = InputFlags::IGNPAR | InputFlags::ICRNL;

        tcflush(file.as_fd(), FlushArg::TCIFLUSH).map_err(attributes)?;
        tcsetattr(file.as_fd(), SetArg::TCSANOW, &termios).map_err(attributes)?;

        debug!(path = %path.display(), speed, "serial device configured");
        Ok(Self { file, path, saved })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for TtyPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl SerialPort for TtyPort {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut fds = [PollFd::new(self.file.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(n) => Ok(n > 0),
            Err(nix::Error::EINTR) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TtyPort {
    fn drop(&mut self) {
        if let Err(e) = tcsetattr(self.file.as_fd(), SetArg::TCSANOW, &self.saved) {
            warn!(path = %self.path.display(), error = %e, "could not restore device attributes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_speeds_map_to_baud_rates() {
        for speed in SUPPORTED_SPEEDS {
            assert!(baud_rate(speed).is_some(), "{} should be supported", speed);
        }
        assert!(baud_rate(4800).is_none());
    }

    #[test]
    fn test_missing_device_is_an_open_error() {
        let err = TtyPort::open("/nonexistent/ttyLES0", 115200).unwrap_err();
        assert!(matches!(err, DeviceError::Open { .. }));
    }

    #[test]
    fn test_regular_file_is_an_attribute_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = TtyPort::open(file.path(), 115200).unwrap_err();
        assert!(matches!(err, DeviceError::Attributes { .. }));
    }
}
