//! Delay statistics and the smoothed load estimate.
//!
//! [`LoadEstimator`] owns the single [`LoadInfo`] record of the process
//! together with the sliding window. The monitor thread feeds it through
//! [`LoadEstimator::update`]; the request server reads it through
//! [`LoadEstimator::snapshot`]. Both take the same short-lived lock, so a
//! snapshot always reflects a whole number of updates.

pub mod curve;
mod window;

pub use curve::{evaluate, Expression, LoadCurve};
pub use window::SlidingWindow;

use std::fmt;
use std::num::NonZeroUsize;

use les_types::{LoadInfo, Sample, Status};
use parking_lot::Mutex;

/// Immutable estimator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorParams {
    /// Smoothing factor `w` in `[0, 1]`.
    pub smoothing: f64,
    /// Window averages below this delay (ns) count as zero load.
    pub low_delay_threshold: Sample,
    /// Sliding window capacity.
    pub window_size: NonZeroUsize,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            smoothing: 0.85,
            low_delay_threshold: 135_000,
            window_size: NonZeroUsize::MIN,
        }
    }
}

#[derive(Debug)]
struct EstimatorState {
    info: LoadInfo,
    window: SlidingWindow,
}

/// Thread-safe owner of the shared statistics record.
pub struct LoadEstimator {
    params: EstimatorParams,
    curve: Box<dyn LoadCurve>,
    state: Mutex<EstimatorState>,
}

impl LoadEstimator {
    /// Create an estimator with empty statistics and status 400.
    pub fn new(params: EstimatorParams, curve: impl LoadCurve + 'static) -> Self {
        Self {
            params,
            curve: Box::new(curve),
            state: Mutex::new(EstimatorState {
                info: LoadInfo::new(Status::DEVICE_UNAVAILABLE),
                window: SlidingWindow::new(params.window_size),
            }),
        }
    }

    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }

    /// Fold one accepted sample into the statistics and return the new load.
    ///
    /// Raw delay smoothing weights history by `w`, load smoothing weights the
    /// previous load by `w`: `weighted_avg = (1-w)*s + w*weighted_avg` but
    /// `load = w*load + (1-w)*l`. A `min` of `0` means "not yet set".
    pub fn update(&self, sample: Sample) -> f64 {
        let w = self.params.smoothing;
        let mut state = self.state.lock();
        let EstimatorState { info, window } = &mut *state;

        info.nsamples += 1;
        info.sample_sum = info.sample_sum.saturating_add(sample);
        info.avg = info.sample_sum as f64 / info.nsamples as f64;

        info.weighted_avg = (1.0 - w) * sample as f64 + w * info.weighted_avg;

        if sample > info.max {
            info.max = sample;
        }
        if sample < info.min || info.min == 0 {
            info.min = sample;
        }

        window.push(sample);
        let window_avg = window.average().unwrap_or(sample as f64);

        let instant = if window_avg < self.params.low_delay_threshold as f64 {
            0.0
        } else {
            self.curve.load_at(window_avg).min(1.0)
        };

        info.load_type = w * info.load_type + (1.0 - w) * instant;
        info.load_type
    }

    /// Copy of the current statistics.
    pub fn snapshot(&self) -> LoadInfo {
        self.state.lock().info
    }

    /// Set the status reported with every snapshot.
    pub fn set_status(&self, status: Status) {
        self.state.lock().info.status = status;
    }
}

impl fmt::Debug for LoadEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadEstimator")
            .field("params", &self.params)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
