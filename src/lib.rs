//! # les
//!
//! A load estimation server. A monitor thread reads one-way delay samples
//! from a PTP timing device on a serial line, keeps running and windowed
//! delay statistics, and derives a smoothed network load estimate. The main
//! thread answers `LREQ` queries from clients with an `LRSP` snapshot of
//! those statistics over UDP or TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  monitor thread                        main thread           │
//! │  ┌──────────────┐                      ┌───────────────┐     │
//! │  │ DeviceReader │                      │ RequestServer │◀── LREQ
//! │  └──────┬───────┘                      └───────┬───────┘ ──▶ LRSP
//! │         │ sample                               │ snapshot    │
//! │         ▼                                      ▼             │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │ LoadEstimator (LoadInfo + SlidingWindow, one lock)   │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`device`]**: serial port setup, line reading and resynchronization
//! - **[`estimator`]**: the shared statistics record, sliding window and
//!   load curves
//! - **[`protocol`]**: message codecs, peek-then-read framing, transports
//! - **[`monitor`]** and **[`server`]**: the two thread loops
//! - **[`shutdown`]**: the run state both loops poll
//! - **[`config`]** and **[`client`]**: settings for `les`, queries for `lec`
//!
//! ## Example
//!
//! ```
//! use les::{EstimatorParams, LoadEstimator};
//!
//! let estimator = LoadEstimator::new(EstimatorParams::default(), |delay: f64| delay / 500_000.0);
//! estimator.update(150_000);
//! estimator.update(160_000);
//!
//! let info = estimator.snapshot();
//! assert_eq!(info.nsamples, 2);
//! assert_eq!(info.min, 150_000);
//! assert!(info.load_type > 0.0);
//! ```

pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod estimator;
pub mod monitor;
pub mod protocol;
pub mod server;
pub mod shutdown;

pub use client::{LoadClient, LoadResponse, OutputFormat};
pub use config::Settings;
pub use device::{DeviceReader, ReaderState, SerialPort};
pub use error::{ConfigError, CurveError, DeviceError, LineError, ProtocolError};
pub use estimator::{EstimatorParams, Expression, LoadCurve, LoadEstimator, SlidingWindow};
pub use monitor::{MonitorLoop, MonitorStats, SampleLog};
pub use protocol::{Frame, MessageFramer, Protocol};
pub use server::{RequestServer, ServerStats};
pub use shutdown::{RunState, Shutdown};

pub use les_types::{LoadInfo, MessageKind, Sample, Status};
