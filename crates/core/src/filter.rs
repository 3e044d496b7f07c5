// Lowpass filter specifications and coefficient sets

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Request a minimum-phase filter instead of a linear-phase one
pub const FILTER_MINIMUM_PHASE: u32 = 0x1;

/// Lowpass filter specification.
///
/// Band edges are normalised so that 1.0 is the Nyquist frequency of the
/// rate the filter runs at. Two specs are equal only when every field is
/// bitwise identical, which makes the type usable as a cache key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterSpec {
    pub passband_edge: f64,
    pub stopband_edge: f64,
    pub passband_ripple: f64,
    pub stopband_ripple: f64,
    pub flags: u32,
}

impl FilterSpec {
    pub fn is_minimum_phase(&self) -> bool {
        self.flags & FILTER_MINIMUM_PHASE != 0
    }
}

impl PartialEq for FilterSpec {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FilterSpec {}

impl PartialOrd for FilterSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FilterSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.passband_edge
            .total_cmp(&other.passband_edge)
            .then_with(|| self.stopband_edge.total_cmp(&other.stopband_edge))
            .then_with(|| self.passband_ripple.total_cmp(&other.passband_ripple))
            .then_with(|| self.stopband_ripple.total_cmp(&other.stopband_ripple))
            .then_with(|| self.flags.cmp(&other.flags))
    }
}

/// Synthesised FIR taps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterCoefs {
    pub taps: Vec<f64>,
}

impl FilterCoefs {
    pub fn new(taps: Vec<f64>) -> Self {
        Self { taps }
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn into_taps(self) -> Vec<f64> {
        self.taps
    }
}

impl From<Vec<f64>> for FilterCoefs {
    fn from(taps: Vec<f64>) -> Self {
        Self { taps }
    }
}
