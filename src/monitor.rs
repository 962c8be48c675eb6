//! The delay monitor: device lines in, estimator updates and log lines out.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local};
use les_types::{Sample, Status};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::device::{is_sync_duplicate, DeviceLine, DeviceReader, ReplayPort, SerialPort, TtyPort};
use crate::error::DeviceError;
use crate::estimator::LoadEstimator;
use crate::shutdown::Shutdown;

/// Append-only log of accepted samples, one
/// `YYYY-MM-DD,HH:MM:SS.mmm<TAB>sample<TAB>load` line each.
#[derive(Debug)]
pub struct SampleLog<W> {
    out: W,
}

impl SampleLog<File> {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> SampleLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write and flush one line stamped with the current local time.
    pub fn record(&mut self, sample: Sample, load: f64) -> io::Result<()> {
        self.record_at(Local::now(), sample, load)
    }

    pub fn record_at(&mut self, at: DateTime<Local>, sample: Sample, load: f64) -> io::Result<()> {
        writeln!(
            self.out,
            "{}\t{}\t{:.6}",
            at.format("%Y-%m-%d,%H:%M:%S%.3f"),
            sample,
            load
        )?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Counters reported when the monitor exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Samples fed to the estimator.
    pub accepted: u64,
    /// SYNC duplicates dropped.
    pub skipped_sync: u64,
    /// Lines that did not parse or gave a non-positive delay.
    pub rejected: u64,
    /// Framing losses recovered by resynchronizing.
    pub resyncs: u64,
}

/// Drives a [`DeviceReader`] into the estimator until shutdown or end of
/// input.
#[derive(Debug)]
pub struct MonitorLoop<P, W> {
    reader: DeviceReader<P>,
    estimator: Arc<LoadEstimator>,
    log: SampleLog<W>,
    shutdown: Shutdown,
    skip_sync: bool,
    line_timeout: Duration,
}

impl<P: SerialPort, W: Write> MonitorLoop<P, W> {
    pub fn new(
        reader: DeviceReader<P>,
        estimator: Arc<LoadEstimator>,
        log: SampleLog<W>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            reader,
            estimator,
            log,
            shutdown,
            skip_sync: false,
            line_timeout: Duration::from_millis(1200),
        }
    }

    /// Drop samples whose T3/T4 repeat the previous line.
    pub fn skip_sync(mut self, skip: bool) -> Self {
        self.skip_sync = skip;
        self
    }

    pub fn line_timeout(mut self, timeout: Duration) -> Self {
        self.line_timeout = timeout;
        self
    }

    /// Run until shutdown or until the device closes.
    ///
    /// Status turns 200 with the first complete line and back to 400 when
    /// this returns, whatever the reason.
    pub fn run(mut self) -> Result<(MonitorStats, SampleLog<W>), DeviceError> {
        let mut stats = MonitorStats::default();
        let result = self.pump(&mut stats);
        self.estimator.set_status(Status::DEVICE_UNAVAILABLE);
        stats.resyncs = self.reader.resync_count();

        match result {
            Ok(()) => Ok((stats, self.log)),
            Err(DeviceError::Closed) => {
                info!("device input ended");
                Ok((stats, self.log))
            }
            Err(e) => Err(e),
        }
    }

    fn pump(&mut self, stats: &mut MonitorStats) -> Result<(), DeviceError> {
        let shutdown = self.shutdown.clone();
        let cancelled = move || !shutdown.is_running();
        let mut previous: Option<DeviceLine> = None;
        let mut online = false;

        while self.shutdown.is_running() {
            let Some(bytes) = self.reader.next_line(self.line_timeout, &cancelled)? else {
                continue;
            };
            if !online {
                online = true;
                self.estimator.set_status(Status::OK);
                info!("device synchronized, estimating load");
            }

            let line = match DeviceLine::parse(&bytes) {
                Ok(line) => line,
                Err(e) => {
                    debug!(error = %e, "rejected device line");
                    stats.rejected += 1;
                    continue;
                }
            };

            if self.skip_sync && is_sync_duplicate(previous.as_ref(), &line) {
                previous = Some(line);
                stats.skipped_sync += 1;
                continue;
            }

            let sample = match line.delay() {
                Ok(sample) if sample > 0 => sample,
                Ok(sample) => {
                    debug!(sample, "non-positive delay ignored");
                    stats.rejected += 1;
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "rejected device line");
                    stats.rejected += 1;
                    continue;
                }
            };

            previous = Some(line);
            let load = self.estimator.update(sample);
            stats.accepted += 1;
            if let Err(e) = self.log.record(sample, load) {
                warn!(error = %e, "could not write sample log");
            }
        }
        Ok(())
    }
}

/// Start the monitor thread: open the sample log and the device (or replay
/// file), then run until shutdown.
///
/// Failing to open either leaves the status at 400 and ends only this
/// thread; the request server keeps answering.
pub fn spawn(
    settings: &Settings,
    estimator: Arc<LoadEstimator>,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>> {
    let settings = settings.clone();
    thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let log = match SampleLog::open(&settings.outfile) {
                Ok(log) => log,
                Err(e) => {
                    error!(
                        path = %settings.outfile.display(),
                        error = %e,
                        "could not open sample log"
                    );
                    return;
                }
            };

            let outcome = match &settings.replay {
                Some(path) => File::open(path)
                    .map_err(|source| DeviceError::Open {
                        path: path.clone(),
                        source,
                    })
                    .and_then(|file| {
                        info!(path = %path.display(), "replaying recorded device input");
                        let port = ReplayPort::new(BufReader::new(file));
                        run_on(port, log, &settings, estimator.clone(), shutdown)
                    }),
                None => TtyPort::open(&settings.tty_device, settings.tty_speed).and_then(|port| {
                    info!(
                        device = %port.path().display(),
                        speed = settings.tty_speed,
                        "device opened"
                    );
                    run_on(port, log, &settings, estimator.clone(), shutdown)
                }),
            };

            estimator.set_status(Status::DEVICE_UNAVAILABLE);
            match outcome {
                Ok(stats) => info!(
                    accepted = stats.accepted,
                    skipped_sync = stats.skipped_sync,
                    rejected = stats.rejected,
                    resyncs = stats.resyncs,
                    "delay monitor stopped"
                ),
                Err(e) => error!(error = %e, "delay monitor failed"),
            }
        })
}

fn run_on<P: SerialPort>(
    port: P,
    log: SampleLog<File>,
    settings: &Settings,
    estimator: Arc<LoadEstimator>,
    shutdown: Shutdown,
) -> Result<MonitorStats, DeviceError> {
    let (stats, _) = MonitorLoop::new(DeviceReader::new(port), estimator, log, shutdown)
        .skip_sync(settings.skip_sync)
        .line_timeout(settings.device_timeout())
        .run()?;
    Ok(stats)
}
