//! Dense segment-by-week panel.
//!
//! Every known segment gets a row for each of the 53 week buckets, with
//! zero counts where nothing happened, so the model sees an explicit
//! "no crash this week" observation instead of a missing row.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike as _, NaiveDate};
use vz_record_models::{BucketCounts, CanonicalRow, SegmentId, week_range};

use crate::road::RoadFeatures;

/// Crash and concern counts for one (segment, week) bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekCounts {
    pub crash: u64,
    pub concern: u64,
}

/// Outer-joins crash and concern counts on (segment id, week).
#[must_use]
pub fn combine_counts(
    crashes: &BucketCounts,
    concerns: &BucketCounts,
) -> BTreeMap<(SegmentId, u32), WeekCounts> {
    let mut combined: BTreeMap<(SegmentId, u32), WeekCounts> = BTreeMap::new();

    for (key, &count) in crashes {
        combined.entry(key.clone()).or_default().crash += count;
    }
    for (key, &count) in concerns {
        combined.entry(key.clone()).or_default().concern += count;
    }

    combined
}

/// Builds the dense canonical panel.
///
/// The segment set is every segment in the road feature table plus every
/// segment that only appears in the event counts. The latter get empty
/// features and are reported with a warning. Rows are ordered by segment
/// id, then week.
#[must_use]
pub fn merge_canonical(
    features: &RoadFeatures,
    counts: &BTreeMap<(SegmentId, u32), WeekCounts>,
) -> Vec<CanonicalRow> {
    let mut segments: BTreeSet<&SegmentId> = features.rows.keys().collect();

    let event_only: BTreeSet<&SegmentId> = counts
        .keys()
        .map(|(id, _)| id)
        .filter(|id| !features.rows.contains_key(*id))
        .collect();
    if !event_only.is_empty() {
        log::warn!(
            "{} segments have events but no road features; their feature columns will be empty",
            event_only.len()
        );
        log::debug!(
            "Segments without road features: {}",
            event_only.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(", ")
        );
    }
    segments.extend(event_only);

    let outside: u64 = counts
        .iter()
        .filter(|((_, week), _)| !week_range().contains(week))
        .map(|(_, c)| c.crash + c.concern)
        .sum();
    if outside > 0 {
        log::warn!("{outside} events fall outside weeks 1-53 and were dropped");
    }

    let empty = vec![None; features.columns.len()];
    let mut rows = Vec::with_capacity(segments.len() * week_range().count());

    for segment_id in segments {
        let segment_features = features.rows.get(segment_id).unwrap_or(&empty);
        for week in week_range() {
            let week_counts = counts
                .get(&(segment_id.clone(), week))
                .copied()
                .unwrap_or_default();
            rows.push(CanonicalRow {
                segment_id: segment_id.clone(),
                week,
                crash: week_counts.crash,
                concern: week_counts.concern,
                features: segment_features.clone(),
            });
        }
    }

    rows
}

/// Number of ISO weeks (52 or 53) in the given ISO year.
#[must_use]
pub fn iso_weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28).map_or(52, |d| d.iso_week().week())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> RoadFeatures {
        let mut rows = BTreeMap::new();
        rows.insert(SegmentId::from("1"), vec![Some(100), Some(25)]);
        rows.insert(SegmentId::from("2"), vec![None, Some(30)]);
        RoadFeatures {
            columns: vec!["AADT".to_string(), "SPEEDLIMIT".to_string()],
            rows,
        }
    }

    #[test]
    fn combines_crash_and_concern_counts() {
        let mut crashes = BucketCounts::new();
        crashes.insert((SegmentId::from("1"), 3), 2);
        let mut concerns = BucketCounts::new();
        concerns.insert((SegmentId::from("1"), 3), 1);
        concerns.insert((SegmentId::from("2"), 4), 5);

        let combined = combine_counts(&crashes, &concerns);
        assert_eq!(combined.len(), 2);
        assert_eq!(
            combined[&(SegmentId::from("1"), 3)],
            WeekCounts { crash: 2, concern: 1 }
        );
        assert_eq!(
            combined[&(SegmentId::from("2"), 4)],
            WeekCounts { crash: 0, concern: 5 }
        );
    }

    #[test]
    fn every_segment_gets_fifty_three_weeks() {
        let mut crashes = BucketCounts::new();
        crashes.insert((SegmentId::from("1"), 1), 4);
        let counts = combine_counts(&crashes, &BucketCounts::new());

        let rows = merge_canonical(&features(), &counts);
        assert_eq!(rows.len(), 2 * 53);

        let first = &rows[0];
        assert_eq!(first.segment_id.as_str(), "1");
        assert_eq!(first.week, 1);
        assert_eq!(first.crash, 4);
        assert_eq!(first.concern, 0);
        assert_eq!(first.features, vec![Some(100), Some(25)]);

        assert!(rows[1..].iter().all(|r| r.crash == 0 && r.concern == 0));
        assert_eq!(rows[52].week, 53);
        assert_eq!(rows[53].segment_id.as_str(), "2");
        assert_eq!(rows[53].features, vec![None, Some(30)]);
    }

    #[test]
    fn segments_with_only_events_are_kept_with_empty_features() {
        let mut concerns = BucketCounts::new();
        concerns.insert((SegmentId::from("9"), 10), 1);
        let counts = combine_counts(&BucketCounts::new(), &concerns);

        let rows = merge_canonical(&features(), &counts);
        assert_eq!(rows.len(), 3 * 53);

        let nine: Vec<&CanonicalRow> = rows.iter().filter(|r| r.segment_id.as_str() == "9").collect();
        assert_eq!(nine.len(), 53);
        assert!(nine.iter().all(|r| r.features == vec![None, None]));
        assert_eq!(nine.iter().map(|r| r.concern).sum::<u64>(), 1);
        assert_eq!(nine[9].concern, 1);
    }

    #[test]
    fn panel_totals_match_event_totals() {
        let mut crashes = BucketCounts::new();
        crashes.insert((SegmentId::from("1"), 1), 2);
        crashes.insert((SegmentId::from("2"), 53), 3);
        let mut concerns = BucketCounts::new();
        concerns.insert((SegmentId::from("2"), 20), 7);

        let rows = merge_canonical(&features(), &combine_counts(&crashes, &concerns));
        assert_eq!(rows.iter().map(|r| r.crash).sum::<u64>(), 5);
        assert_eq!(rows.iter().map(|r| r.concern).sum::<u64>(), 7);
    }

    #[test]
    fn empty_inputs_produce_an_empty_panel() {
        let rows = merge_canonical(&RoadFeatures::default(), &BTreeMap::new());
        assert!(rows.is_empty());
    }

    #[test]
    fn counts_iso_weeks() {
        assert_eq!(iso_weeks_in_year(2015), 53);
        assert_eq!(iso_weeks_in_year(2016), 52);
        assert_eq!(iso_weeks_in_year(2020), 53);
    }
}
