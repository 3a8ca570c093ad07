//! Latest-position-per-station aggregation.
//!
//! Measurements are grouped by `key` and the record with the greatest `timestamp`
//! wins its group. Ties on the timestamp go to the record inserted last, and a
//! record without a timestamp only wins when none of its group has one. Storage
//! engines that can push the aggregation down must apply the same rule.

use crate::error::StoreError;
use crate::measurement::{LatestStationMeta, Measurement};
use futures::{Stream, TryStreamExt};
use std::collections::BTreeMap;

/// Running latest-wins state, fed in insertion order.
#[derive(Debug, Default)]
pub struct LatestTracker {
    latest: BTreeMap<String, Measurement>,
}

impl LatestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one record into its group.
    pub fn observe(&mut self, m: Measurement) {
        match self.latest.get_mut(&m.key) {
            // `None < Some(_)`, so untimed records lose to any timed one
            Some(current) if m.timestamp < current.timestamp => {}
            Some(current) => *current = m,
            None => {
                self.latest.insert(m.key.clone(), m);
            }
        }
    }

    /// One summary per key, ordered by key.
    pub fn finish(self) -> Vec<LatestStationMeta> {
        self.latest.values().map(LatestStationMeta::from_measurement).collect()
    }
}

/// Reduces records, given in insertion order, to one summary per key.
pub fn latest_per_key<I>(measurements: I) -> Vec<LatestStationMeta>
where
    I: IntoIterator<Item = Measurement>,
{
    let mut tracker = LatestTracker::new();
    for m in measurements {
        tracker.observe(m);
    }
    tracker.finish()
}

/// Drains a measurement stream through a [`LatestTracker`].
pub async fn latest_from_stream<S>(measurements: S) -> Result<Vec<LatestStationMeta>, StoreError>
where
    S: Stream<Item = Result<Measurement, StoreError>>,
{
    let tracker = measurements
        .try_fold(LatestTracker::new(), |mut tracker, m| async move {
            tracker.observe(m);
            Ok(tracker)
        })
        .await?;
    Ok(tracker.finish())
}
