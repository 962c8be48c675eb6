//! Timing device access: line tokenizing, framing recovery and the serial
//! port itself.
//!
//! The device emits one fixed-width ASCII line per delay measurement,
//! terminated by a blank line (`\n\n`). [`DeviceReader`] reads those lines
//! from any [`SerialPort`] and falls back to resynchronizing whenever a read
//! does not come back with exactly [`LINE_LEN`] bytes.

pub(crate) mod line;
mod reader;
mod tty;

pub use line::{extract_sample, is_sync_duplicate, DeviceLine};
pub use reader::{DeviceReader, ReaderState, ReplayPort, SerialPort};
pub use tty::{TtyPort, SUPPORTED_SPEEDS};

/// Length of a sample line without its terminator.
pub const LINE_LEN: usize = 96;

/// Bytes requested per line read: the line plus its `\n\n` terminator.
pub const FRAME_LEN: usize = LINE_LEN + 2;
