//! On-disk layout conventions of the partitioned data directory.
//!
//! ```text
//! <data_dir>/<database>/<measurement>/date=<YYYY-MM-DD>/hour=<HH>/*.parquet
//!                                                             /_manifest.json
//! ```
//!
//! The functions here only build and parse names; callers join them with a
//! [`crate::storage::DataLocation`] before doing I/O.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Prefix of a calendar-date partition directory.
pub const DATE_PREFIX: &str = "date=";

/// Prefix of an hour partition directory.
pub const HOUR_PREFIX: &str = "hour=";

/// File name of the per-hour partition manifest.
pub const MANIFEST_FILE_NAME: &str = "_manifest.json";

/// Extension of the columnar data files.
pub const PARQUET_EXT: &str = "parquet";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// True when `name` can be a single `<database>` or `<measurement>` path
/// component: not empty, not `.` or `..`, and free of `/`, `\` and NUL.
pub fn is_valid_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Relative path: `<database>/<measurement>`
///
/// Both names must pass [`is_valid_component`]; the resolver checks this
/// before joining.
pub fn measurement_rel_dir(database: &str, measurement: &str) -> PathBuf {
    PathBuf::from(database).join(measurement)
}

/// Directory name for a calendar date, e.g. `date=2025-04-10`.
pub fn date_dir_name(date: NaiveDate) -> String {
    format!("{DATE_PREFIX}{}", date.format(DATE_FORMAT))
}

/// Directory name for an hour of the day, e.g. `hour=09`.
pub fn hour_dir_name(hour: u32) -> String {
    format!("{HOUR_PREFIX}{hour:02}")
}

/// Relative path: `date=<YYYY-MM-DD>/hour=<HH>`
pub fn partition_rel_dir(date: NaiveDate, hour: u32) -> PathBuf {
    PathBuf::from(date_dir_name(date)).join(hour_dir_name(hour))
}

/// Parse a `date=YYYY-MM-DD` directory name.
///
/// Anything after the calendar date (for example a time-of-day suffix such as
/// `date=2025-04-10T00:00:00`) is ignored.
pub fn parse_date_dir(name: &str) -> Option<NaiveDate> {
    let rest = name.strip_prefix(DATE_PREFIX)?;
    let date_part = rest.get(..10)?;
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Parse an `hour=<0-23>` directory name. Both `hour=7` and `hour=07` are accepted.
pub fn parse_hour_dir(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(HOUR_PREFIX)?;
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = rest.parse().ok()?;
    (hour < 24).then_some(hour)
}

/// Path of the manifest inside a partition directory.
pub fn manifest_path(partition_dir: &Path) -> PathBuf {
    partition_dir.join(MANIFEST_FILE_NAME)
}

/// True when the path carries the columnar data file extension.
pub fn is_parquet_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PARQUET_EXT))
}
