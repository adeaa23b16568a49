//! Calendar-directed resolution over `date=YYYY-MM-DD/hour=HH` partitions.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::debug;

use crate::{
    interval::{TimeBounds, date_and_hour},
    layout,
    manifest::read_manifest,
    resolve::{
        locate_entry,
        soft_error::{SoftError, SoftErrorKind},
    },
    storage,
};

/// Hour filter for one date directory. Only the boundary days of the query
/// interval restrict hours; interior days keep all of them.
fn hour_in_range(
    date: NaiveDate,
    hour: u32,
    (start_date, start_hour): (NaiveDate, u32),
    (end_date, end_hour): (NaiveDate, u32),
) -> bool {
    let after_start = date != start_date || hour >= start_hour;
    let before_end = date != end_date || hour <= end_hour;
    after_start && before_end
}

/// Collect the hour directories whose calendar slot can hold rows in `bounds`.
async fn candidate_partitions(
    measurement_dir: &Path,
    bounds: &TimeBounds,
    skipped: &mut Vec<SoftError>,
) -> Vec<PathBuf> {
    let start = date_and_hour(bounds.start);
    let end = date_and_hour(bounds.end);

    let dates = match storage::list_dir(measurement_dir).await {
        Ok(entries) => entries,
        Err(e) => {
            skipped.push(SoftError::new(
                measurement_dir,
                SoftErrorKind::DirectoryUnreadable {
                    message: e.to_string(),
                },
            ));
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for date_entry in dates.into_iter().filter(|e| e.is_dir) {
        let Some(date) = layout::parse_date_dir(&date_entry.name) else {
            continue;
        };
        if date < start.0 || date > end.0 {
            continue;
        }

        let hours = match storage::list_dir(&date_entry.path).await {
            Ok(entries) => entries,
            Err(e) => {
                skipped.push(SoftError::new(
                    &date_entry.path,
                    SoftErrorKind::DirectoryUnreadable {
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        };

        out.extend(
            hours
                .into_iter()
                .filter(|e| e.is_dir)
                .filter(|e| {
                    layout::parse_hour_dir(&e.name)
                        .is_some_and(|hour| hour_in_range(date, hour, start, end))
                })
                .map(|e| e.path),
        );
    }
    out
}

/// Resolve one hour partition through its manifest.
async fn resolve_partition(
    data_root: &Path,
    partition_dir: PathBuf,
    bounds: TimeBounds,
) -> (Vec<PathBuf>, Vec<SoftError>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();

    let manifest = match read_manifest(&partition_dir).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            debug!("no manifest in {}, skipping", partition_dir.display());
            return (files, skipped);
        }
        Err(e) => {
            skipped.push(SoftError::new(
                &partition_dir,
                SoftErrorKind::PartialManifestReadFailure {
                    message: e.to_string(),
                },
            ));
            return (files, skipped);
        }
    };

    if !bounds.overlaps(manifest.min_time, manifest.max_time) {
        debug!(
            "pruned {} (manifest [{}, {}])",
            partition_dir.display(),
            manifest.min_time,
            manifest.max_time
        );
        return (files, skipped);
    }

    for entry in manifest.files_overlapping(Some(&bounds)) {
        match locate_entry(data_root, &partition_dir, &entry.path).await {
            Ok(path) => files.push(path),
            Err(soft) => skipped.push(soft),
        }
    }
    (files, skipped)
}

/// Hive resolution of `measurement_dir` against closed `bounds`.
pub(crate) async fn resolve_hive(
    data_root: &Path,
    measurement_dir: &Path,
    bounds: TimeBounds,
    concurrency: usize,
) -> (Vec<PathBuf>, Vec<SoftError>) {
    let mut skipped = Vec::new();
    let partitions = candidate_partitions(measurement_dir, &bounds, &mut skipped).await;
    debug!(
        "hive: {} candidate partition(s) under {}",
        partitions.len(),
        measurement_dir.display()
    );

    let results: Vec<_> = stream::iter(partitions)
        .map(|dir| resolve_partition(data_root, dir, bounds))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut files = Vec::new();
    for (f, s) in results {
        files.extend(f);
        skipped.extend(s);
    }
    (files, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn boundary_days_restrict_hours() {
        let start = (d("2025-04-10"), 14);
        let end = (d("2025-04-11"), 9);

        assert!(!hour_in_range(d("2025-04-10"), 13, start, end));
        assert!(hour_in_range(d("2025-04-10"), 14, start, end));
        assert!(hour_in_range(d("2025-04-10"), 23, start, end));
        assert!(hour_in_range(d("2025-04-11"), 0, start, end));
        assert!(hour_in_range(d("2025-04-11"), 9, start, end));
        assert!(!hour_in_range(d("2025-04-11"), 10, start, end));
    }

    #[test]
    fn interior_days_keep_every_hour() {
        let start = (d("2025-04-10"), 22);
        let end = (d("2025-04-12"), 1);
        for hour in 0..24 {
            assert!(hour_in_range(d("2025-04-11"), hour, start, end));
        }
    }

    #[test]
    fn single_day_uses_both_bounds() {
        let day = d("2025-04-10");
        let start = (day, 3);
        let end = (day, 5);
        let kept: Vec<u32> = (0..24)
            .filter(|h| hour_in_range(day, *h, start, end))
            .collect();
        assert_eq!(kept, vec![3, 4, 5]);
    }
}
