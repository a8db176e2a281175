//! Repeat suppression.
//!
//! Every emitted caption leaves a record keyed by its hash. A record with a
//! positive interval blocks the same caption for that many seconds; a record
//! with an interval of zero or less blocks it only for the rest of the tick it
//! was emitted in.

use std::collections::HashMap;

/// Last emission of one caption
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepeatRecord {
    /// Clock time of the last emission, in seconds
    pub last_time: f64,
    /// Tick of the last emission
    pub last_tick: u64,
    /// Minimum seconds between emissions; `<= 0` means once per tick
    pub interval: f32,
}

impl RepeatRecord {
    fn blocks(&self, now: f64, tick: u64) -> bool {
        if self.interval > 0.0 {
            now - self.last_time < f64::from(self.interval)
        } else {
            self.last_tick == tick
        }
    }
}

/// Per-caption repeat records
#[derive(Debug, Default)]
pub struct RepeatSuppressor {
    records: HashMap<u32, RepeatRecord>,
}

impl RepeatSuppressor {
    /// Create an empty record table
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a caption may be emitted now, recording it if so
    ///
    /// `interval` is the caption's `<norepeat>` value, if any. Suppressed
    /// emissions leave the existing record untouched.
    pub fn try_emit(&mut self, hash: u32, interval: Option<f32>, now: f64, tick: u64) -> bool {
        if self
            .records
            .get(&hash)
            .is_some_and(|record| record.blocks(now, tick))
        {
            return false;
        }

        self.records.insert(
            hash,
            RepeatRecord {
                last_time: now,
                last_tick: tick,
                interval: interval.unwrap_or(0.0),
            },
        );
        true
    }

    /// Record for a caption, if it was ever emitted
    pub fn record(&self, hash: u32) -> Option<&RepeatRecord> {
        self.records.get(&hash)
    }

    /// Forget every record
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_interval_is_wall_clock() {
        let mut repeats = RepeatSuppressor::new();
        assert!(repeats.try_emit(7, Some(4.0), 0.0, 0));
        assert!(!repeats.try_emit(7, Some(4.0), 2.0, 120));
        assert!(repeats.try_emit(7, Some(4.0), 5.0, 300));
        // The window restarts from the last accepted emission
        assert!(!repeats.try_emit(7, Some(4.0), 8.5, 510));
        assert!(repeats.try_emit(7, Some(4.0), 9.0, 540));
    }

    #[test]
    fn test_zero_interval_is_same_tick_only() {
        let mut repeats = RepeatSuppressor::new();
        assert!(repeats.try_emit(1, Some(0.0), 1.0, 10));
        assert!(!repeats.try_emit(1, Some(0.0), 1.0, 10));
        assert!(repeats.try_emit(1, Some(0.0), 1.001, 11));

        // No <norepeat> behaves the same way
        assert!(repeats.try_emit(2, None, 1.0, 11));
        assert!(!repeats.try_emit(2, None, 1.0, 11));
        assert!(repeats.try_emit(2, None, 1.0, 12));
    }

    #[test]
    fn test_negative_interval_is_same_tick_only() {
        let mut repeats = RepeatSuppressor::new();
        assert!(repeats.try_emit(3, Some(-5.0), 0.0, 1));
        assert!(!repeats.try_emit(3, Some(-5.0), 0.0, 1));
        assert!(repeats.try_emit(3, Some(-5.0), 0.0, 2));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut repeats = RepeatSuppressor::new();
        assert!(repeats.try_emit(1, Some(10.0), 0.0, 0));
        assert!(repeats.try_emit(2, Some(10.0), 0.0, 0));
        assert_eq!(repeats.record(1).map(|r| r.interval), Some(10.0));

        repeats.clear();
        assert!(repeats.record(1).is_none());
        assert!(repeats.try_emit(1, Some(10.0), 0.5, 1));
    }
}
