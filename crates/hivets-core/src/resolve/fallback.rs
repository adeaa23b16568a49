//! Recursive scan used when calendar-directed resolution finds nothing.

use std::{
    collections::{HashSet, VecDeque},
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    interval::TimeBounds,
    layout,
    manifest::read_manifest,
    resolve::{
        locate_entry,
        soft_error::{SoftError, SoftErrorKind},
    },
    storage,
};

/// Walk `measurement_dir` breadth-first.
///
/// A directory with a manifest contributes the manifest's matching files in
/// place of its raw listing; one without contributes every Parquet file it
/// holds. Subdirectories are always queued until `max_depth` is reached
/// (the measurement directory itself is depth 0).
pub(crate) async fn resolve_fallback(
    data_root: &Path,
    measurement_dir: &Path,
    bounds: Option<TimeBounds>,
    max_depth: usize,
) -> (Vec<PathBuf>, Vec<SoftError>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut queue: VecDeque<(PathBuf, usize)> = VecDeque::new();
    queue.push_back((measurement_dir.to_path_buf(), 0));

    while let Some((dir, depth)) = queue.pop_front() {
        match storage::canonicalize(&dir).await {
            Ok(canonical) => {
                if !visited.insert(canonical) {
                    skipped.push(SoftError::new(&dir, SoftErrorKind::Cycle));
                    continue;
                }
            }
            Err(e) => {
                skipped.push(SoftError::new(
                    &dir,
                    SoftErrorKind::DirectoryUnreadable {
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        }

        let entries = match storage::list_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                skipped.push(SoftError::new(
                    &dir,
                    SoftErrorKind::DirectoryUnreadable {
                        message: e.to_string(),
                    },
                ));
                continue;
            }
        };

        let manifest = match read_manifest(&dir).await {
            Ok(m) => m,
            Err(e) => {
                skipped.push(SoftError::new(
                    &dir,
                    SoftErrorKind::PartialManifestReadFailure {
                        message: e.to_string(),
                    },
                ));
                None
            }
        };

        match manifest {
            Some(m) => {
                let gate = bounds.is_none_or(|b| b.overlaps(m.min_time, m.max_time));
                if gate {
                    for entry in m.files_overlapping(bounds.as_ref()) {
                        match locate_entry(data_root, &dir, &entry.path).await {
                            Ok(path) => files.push(path),
                            Err(soft) => skipped.push(soft),
                        }
                    }
                } else {
                    debug!("fallback: pruned {} by manifest interval", dir.display());
                }
            }
            None => files.extend(
                entries
                    .iter()
                    .filter(|e| e.is_file && layout::is_parquet_file(&e.path))
                    .map(|e| e.path.clone()),
            ),
        }

        for sub in entries.into_iter().filter(|e| e.is_dir) {
            if depth < max_depth {
                queue.push_back((sub.path, depth + 1));
            } else {
                skipped.push(SoftError::new(
                    sub.path,
                    SoftErrorKind::DepthLimit { max_depth },
                ));
            }
        }
    }

    debug!(
        "fallback: {} file(s) from {} director(ies) under {}",
        files.len(),
        visited.len(),
        measurement_dir.display()
    );
    (files, skipped)
}
