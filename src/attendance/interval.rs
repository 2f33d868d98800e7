use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

use super::DayEvidence;

/// Interval length in days to player name to cumulative attendance.
pub type IntervalBuckets = BTreeMap<u32, BTreeMap<String, u32>>;

/// Folds per-day evidence into trailing windows.
///
/// A day `d` days before today counts toward every interval longer than `d`,
/// so the windows are cumulative rather than exclusive.
#[derive(Clone, Debug)]
pub struct IntervalAggregator {
    intervals: Vec<u32>,
}

impl IntervalAggregator {
    pub fn new(intervals: Vec<u32>) -> Self {
        Self { intervals }
    }

    pub fn lookback_days(&self) -> u32 {
        self.intervals.iter().copied().max().unwrap_or(0)
    }

    /// Every configured interval is present in the result, possibly empty.
    pub fn aggregate(&self, by_day: &DayEvidence, today: NaiveDate) -> IntervalBuckets {
        let mut buckets: IntervalBuckets = self
            .intervals
            .iter()
            .map(|&interval| (interval, BTreeMap::new()))
            .collect();

        for delta in 0..self.lookback_days() {
            let Some(day) = today.checked_sub_days(Days::new(delta as u64)) else {
                break;
            };
            let Some(records) = by_day.get(&day) else {
                continue;
            };

            for record in records {
                for &interval in &self.intervals {
                    if delta < interval {
                        let total = buckets
                            .entry(interval)
                            .or_default()
                            .entry(record.name.clone())
                            .or_insert(0);
                        *total += record.attendance;
                    }
                }
            }
        }

        buckets
    }
}
