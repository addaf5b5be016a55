//! Bounded in-memory history of control cycles.
//!
//! Backed by a fixed-capacity `heapless::Deque`; the runtime capacity
//! (average window + 1) may be smaller than the backing storage. Pushing
//! into a full history evicts the oldest record.

use chrono::NaiveDateTime;
use heapless::Deque;

use crate::error::ConfigError;

/// Backing storage size; the largest supported capacity.
pub const MAX_HISTORY: usize = 129;

/// Result of one control cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlCycleRecord {
    /// Wall-clock time at the start of the cycle.
    pub timestamp: NaiveDateTime,
    /// Calibrated temperature per channel; `None` marks a gap.
    pub temperatures: Vec<Option<f64>>,
    /// PID output per axis; `None` when the axis skipped its update.
    pub outputs: Vec<Option<f64>>,
    /// Actuator state per axis after the cycle.
    pub energized: Vec<bool>,
}

/// Mean of a window of records.
#[derive(Clone, Debug, PartialEq)]
pub struct AveragedRecord {
    /// Timestamp of the newest record in the window.
    pub timestamp: NaiveDateTime,
    /// Mean temperature per channel over the non-gap samples.
    pub temperatures: Vec<Option<f64>>,
    /// Mean PID output per axis over the cycles that updated.
    pub outputs: Vec<Option<f64>>,
    /// Fraction of cycles each actuator was energized.
    pub duty: Vec<f64>,
}

/// Fixed-capacity ring buffer of cycle records.
#[derive(Debug)]
pub struct History {
    records: Deque<ControlCycleRecord, MAX_HISTORY>,
    capacity: usize,
}

impl History {
    /// Creates a history holding at most `capacity` records.
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 || capacity > MAX_HISTORY {
            return Err(ConfigError::InvalidLoop(
                "history capacity must be between 1 and 129",
            ));
        }
        Ok(Self {
            records: Deque::new(),
            capacity,
        })
    }

    /// History sized for an averaging window (`window + 1` records).
    pub fn for_window(window: usize) -> Result<Self, ConfigError> {
        Self::new(window + 1)
    }

    /// Appends a record, returning the evicted one if the history was full.
    pub fn push(&mut self, record: ControlCycleRecord) -> Option<ControlCycleRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.records.pop_front()
        } else {
            None
        };
        let pushed = self.records.push_back(record);
        debug_assert!(pushed.is_ok(), "history capacity exceeds MAX_HISTORY");
        evicted
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been pushed yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Runtime capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ControlCycleRecord> {
        self.records.iter()
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<&ControlCycleRecord> {
        self.records.back()
    }

    /// The newest `n` records, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ControlCycleRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(n))
    }

    /// Averages the newest `window` records.
    ///
    /// Gaps are skipped per column; a column with only gaps averages to
    /// `None`. Returns `None` when the history is empty.
    pub fn average(&self, window: usize) -> Option<AveragedRecord> {
        let latest = self.latest()?;
        let channels = latest.temperatures.len();
        let axes = latest.energized.len();

        let mut temp_sum = vec![(0.0, 0usize); channels];
        let mut out_sum = vec![(0.0, 0usize); axes];
        let mut on_count = vec![0usize; axes];
        let mut cycles = 0usize;

        for record in self.recent(window) {
            cycles += 1;
            for (acc, value) in temp_sum.iter_mut().zip(&record.temperatures) {
                if let Some(v) = value {
                    acc.0 += v;
                    acc.1 += 1;
                }
            }
            for (acc, value) in out_sum.iter_mut().zip(&record.outputs) {
                if let Some(v) = value {
                    acc.0 += v;
                    acc.1 += 1;
                }
            }
            for (count, on) in on_count.iter_mut().zip(&record.energized) {
                if *on {
                    *count += 1;
                }
            }
        }

        let mean = |(sum, n): (f64, usize)| (n > 0).then(|| sum / n as f64);
        Some(AveragedRecord {
            timestamp: latest.timestamp,
            temperatures: temp_sum.into_iter().map(mean).collect(),
            outputs: out_sum.into_iter().map(mean).collect(),
            duty: on_count
                .into_iter()
                .map(|n| n as f64 / cycles as f64)
                .collect(),
        })
    }

    /// Timestamps and per-channel series for a plot consumer.
    ///
    /// Gaps are rendered as NaN so every series has one point per record.
    pub fn series(&self, names: &[String]) -> (Vec<String>, std::collections::BTreeMap<String, Vec<f64>>) {
        let timestamps = self
            .iter()
            .map(|r| r.timestamp.format("%H:%M:%S").to_string())
            .collect();
        let series = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let values = self
                    .iter()
                    .map(|r| r.temperatures.get(i).copied().flatten().unwrap_or(f64::NAN))
                    .collect();
                (name.clone(), values)
            })
            .collect();
        (timestamps, series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, second))
            .unwrap()
    }

    fn record(second: u32, temp: Option<f64>, on: bool) -> ControlCycleRecord {
        ControlCycleRecord {
            timestamp: at(second),
            temperatures: vec![temp],
            outputs: vec![temp.map(|t| -t)],
            energized: vec![on],
        }
    }

    #[test]
    fn capacity_bounds() {
        assert!(History::new(0).is_err());
        assert!(History::new(MAX_HISTORY + 1).is_err());
        assert_eq!(History::for_window(20).unwrap().capacity(), 21);
    }

    #[test]
    fn push_evicts_oldest_when_full() {
        let w = 4;
        let mut h = History::for_window(w).unwrap();
        for i in 0..=w as u32 {
            assert!(h.push(record(i, Some(i as f64), false)).is_none());
        }
        assert_eq!(h.len(), w + 1);

        let evicted = h.push(record(99, Some(99.0), false)).unwrap();
        assert_eq!(evicted.timestamp, at(0));
        assert_eq!(h.len(), w + 1);
        assert_eq!(h.iter().next().unwrap().timestamp, at(1));
        assert_eq!(h.latest().unwrap().timestamp, at(99));
    }

    #[test]
    fn largest_history_keeps_every_push() {
        let mut h = History::new(MAX_HISTORY).unwrap();
        for i in 0..2 * MAX_HISTORY {
            let evicted = h.push(record(0, Some(i as f64), false));
            assert_eq!(evicted.is_some(), i >= MAX_HISTORY);
            assert_eq!(h.latest().unwrap().temperatures, vec![Some(i as f64)]);
        }
        assert_eq!(h.len(), MAX_HISTORY);
        assert_eq!(
            h.iter().next().unwrap().temperatures,
            vec![Some(MAX_HISTORY as f64)]
        );
    }

    #[test]
    fn average_uses_newest_window() {
        let mut h = History::for_window(3).unwrap();
        for (i, t) in [1000.0, 100.0, 200.0, 300.0].into_iter().enumerate() {
            h.push(record(i as u32, Some(t), i % 2 == 0));
        }
        let avg = h.average(3).unwrap();
        assert_eq!(avg.temperatures, vec![Some(200.0)]);
        assert_eq!(avg.outputs, vec![Some(-200.0)]);
        // energized at i = 2 only within the last three
        assert!((avg.duty[0] - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(avg.timestamp, at(3));
    }

    #[test]
    fn average_skips_gaps() {
        let mut h = History::for_window(3).unwrap();
        h.push(record(0, Some(10.0), true));
        h.push(record(1, None, true));
        h.push(record(2, Some(20.0), true));
        let avg = h.average(3).unwrap();
        assert_eq!(avg.temperatures, vec![Some(15.0)]);
        assert_eq!(avg.duty, vec![1.0]);
    }

    #[test]
    fn all_gaps_average_to_none() {
        let mut h = History::for_window(2).unwrap();
        h.push(record(0, None, false));
        h.push(record(1, None, false));
        let avg = h.average(2).unwrap();
        assert_eq!(avg.temperatures, vec![None]);
        assert_eq!(avg.outputs, vec![None]);
    }

    #[test]
    fn empty_history_has_no_average() {
        assert!(History::new(3).unwrap().average(2).is_none());
    }

    #[test]
    fn series_fills_gaps_with_nan() {
        let mut h = History::new(3).unwrap();
        h.push(record(0, Some(1.0), false));
        h.push(record(1, None, false));
        let (ts, series) = h.series(&["cold_head".to_string()]);
        assert_eq!(ts, vec!["12:00:00".to_string(), "12:00:01".to_string()]);
        let values = &series["cold_head"];
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
    }
}
