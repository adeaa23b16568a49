#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{Float64Builder, StringBuilder, TimestampNanosecondBuilder},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use hivets_core::{
    layout,
    manifest::{ManifestFile, PartitionManifest},
};
use parquet::arrow::ArrowWriter;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const HOUR: i64 = 3_600_000_000_000;
/// 2025-04-10T14:00:00Z
pub const APR_10_14H: i64 = 1_744_293_600_000_000_000;

/// One `(time, city, value)` row.
pub type Reading<'a> = (i64, &'a str, f64);

/// Write `rows` as `time` (ns timestamp), `city` and a float column named `metric`.
pub fn write_readings(path: &Path, metric: &str, rows: &[Reading<'_>]) -> TestResult {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut time = TimestampNanosecondBuilder::with_capacity(rows.len());
    let mut city = StringBuilder::new();
    let mut value = Float64Builder::with_capacity(rows.len());
    for (ts, c, v) in rows {
        time.append_value(*ts);
        city.append_value(c);
        value.append_value(*v);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("time", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("city", DataType::Utf8, false),
        Field::new(metric, DataType::Float64, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(time.finish()),
            Arc::new(city.finish()),
            Arc::new(value.finish()),
        ],
    )?;

    let file = std::fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Write one data file into `<root>/<db>/<measurement>/date=../hour=..` and a
/// manifest covering exactly its rows. Returns the file path.
pub fn write_partition(
    root: &Path,
    db: &str,
    measurement: &str,
    file_name: &str,
    metric: &str,
    rows: &[Reading<'_>],
) -> TestResult<PathBuf> {
    let first = rows.first().ok_or("at least one row")?.0;
    let (date, hour) = hivets_core::interval::date_and_hour(first);
    let dir = root
        .join(layout::measurement_rel_dir(db, measurement))
        .join(layout::partition_rel_dir(date, hour));
    let path = dir.join(file_name);
    write_readings(&path, metric, rows)?;

    let min_time = rows.iter().map(|r| r.0).min().unwrap_or(first);
    let max_time = rows.iter().map(|r| r.0).max().unwrap_or(first);
    let manifest = PartitionManifest {
        min_time,
        max_time,
        files: vec![ManifestFile {
            path: file_name.to_string(),
            min_time,
            max_time,
        }],
    };
    std::fs::write(
        layout::manifest_path(&dir),
        serde_json::to_vec(&manifest)?,
    )?;
    Ok(path)
}
