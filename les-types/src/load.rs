//! The shared delay/load statistics record.

use crate::{Sample, Status};

/// Delay and load statistics maintained by the delay monitor.
///
/// A single record exists per server process. The monitor mutates it on
/// every accepted sample; readers only ever see whole copies of it.
///
/// Only `status`, `weighted_avg`, `min`, `max`, `nsamples` and `load_type`
/// travel on the wire. A record decoded from a response leaves `sample_sum`
/// and `avg` at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadInfo {
    /// Server/response status.
    pub status: Status,

    /// Number of samples accepted so far.
    pub nsamples: u64,

    /// Sum of all accepted samples (ns).
    pub sample_sum: i64,

    /// Arithmetic mean of all accepted samples (ns).
    pub avg: f64,

    /// Exponentially smoothed raw delay (ns).
    pub weighted_avg: f64,

    /// Smallest accepted sample; `0` until the first nonzero sample.
    pub min: Sample,

    /// Largest accepted sample; `0` until the first positive sample.
    pub max: Sample,

    /// Smoothed load estimate, nominally within `[0, 1]`.
    pub load_type: f64,
}

impl LoadInfo {
    /// Create an empty record with the given status.
    pub fn new(status: Status) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Create a builder for load records.
    pub fn builder() -> LoadInfoBuilder {
        LoadInfoBuilder::new()
    }

    /// Whether any sample has been accepted.
    pub fn has_samples(&self) -> bool {
        self.nsamples > 0
    }

    /// The load value as reported to clients: negative estimates read as 0.
    pub fn reported_load(&self) -> f64 {
        if self.load_type < 0.0 {
            0.0
        } else {
            self.load_type
        }
    }
}

/// Builder for [`LoadInfo`].
#[derive(Debug, Default)]
pub struct LoadInfoBuilder {
    info: LoadInfo,
}

impl LoadInfoBuilder {
    /// Create a new builder with an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status.
    pub fn status(mut self, status: Status) -> Self {
        self.info.status = status;
        self
    }

    /// Set the sample count.
    pub fn nsamples(mut self, nsamples: u64) -> Self {
        self.info.nsamples = nsamples;
        self
    }

    /// Set the running sample sum.
    pub fn sample_sum(mut self, sum: i64) -> Self {
        self.info.sample_sum = sum;
        self
    }

    /// Set the arithmetic mean.
    pub fn avg(mut self, avg: f64) -> Self {
        self.info.avg = avg;
        self
    }

    /// Set the smoothed delay.
    pub fn weighted_avg(mut self, weighted_avg: f64) -> Self {
        self.info.weighted_avg = weighted_avg;
        self
    }

    /// Set the minimum delay.
    pub fn min(mut self, min: Sample) -> Self {
        self.info.min = min;
        self
    }

    /// Set the maximum delay.
    pub fn max(mut self, max: Sample) -> Self {
        self.info.max = max;
        self
    }

    /// Set the smoothed load.
    pub fn load_type(mut self, load_type: f64) -> Self {
        self.info.load_type = load_type;
        self
    }

    /// Build the record.
    pub fn build(self) -> LoadInfo {
        self.info
    }
}
