//! Consumer of buffered history for live plotting.

use std::collections::BTreeMap;

/// Receives the buffered history after each cycle.
///
/// `timestamps` and every series have the same length; a gap is `NaN`.
/// Implementations should return quickly, they run inside the cycle.
pub trait PlotSink {
    /// Renders or forwards one snapshot.
    fn plot(&mut self, timestamps: &[String], series: &BTreeMap<String, Vec<f64>>);
}
