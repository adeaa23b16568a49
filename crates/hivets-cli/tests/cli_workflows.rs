#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use arrow::array::{Float64Builder, StringBuilder, TimestampNanosecondBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use hivets_core::{
    interval::date_and_hour,
    layout,
    manifest::{ManifestFile, PartitionManifest},
};
use parquet::arrow::ArrowWriter;
use serde_json::Value;
use tempfile::TempDir;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

const HOUR: i64 = 3_600_000_000_000;
/// 2025-04-10T14:00:00Z
const APR_10_14H: i64 = 1_744_293_600_000_000_000;

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_hivets")
}

fn run_cli(data_dir: &Path, args: &[&str]) -> io::Result<Output> {
    Command::new(cli_bin())
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
}

fn assert_cli_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout_json(output: &Output) -> TestResult<Value> {
    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Write `(time, city, temperature)` rows into their hour partition with a manifest.
fn write_partition(
    root: &Path,
    measurement: &str,
    file_name: &str,
    rows: &[(i64, &str, f64)],
) -> TestResult<PathBuf> {
    let first = rows.first().ok_or("at least one row")?.0;
    let (date, hour) = date_and_hour(first);
    let dir = root
        .join(layout::measurement_rel_dir("default", measurement))
        .join(layout::partition_rel_dir(date, hour));
    std::fs::create_dir_all(&dir)?;

    let mut time = TimestampNanosecondBuilder::with_capacity(rows.len());
    let mut city = StringBuilder::new();
    let mut temperature = Float64Builder::with_capacity(rows.len());
    for (ts, c, t) in rows {
        time.append_value(*ts);
        city.append_value(c);
        temperature.append_value(*t);
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("time", DataType::Timestamp(TimeUnit::Nanosecond, None), false),
        Field::new("city", DataType::Utf8, false),
        Field::new("temperature", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(time.finish()),
            Arc::new(city.finish()),
            Arc::new(temperature.finish()),
        ],
    )?;

    let path = dir.join(file_name);
    let mut writer = ArrowWriter::try_new(std::fs::File::create(&path)?, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;

    let min_time = rows.iter().map(|r| r.0).min().unwrap();
    let max_time = rows.iter().map(|r| r.0).max().unwrap();
    let manifest = PartitionManifest {
        min_time,
        max_time,
        files: vec![ManifestFile {
            path: file_name.to_string(),
            min_time,
            max_time,
        }],
    };
    std::fs::write(layout::manifest_path(&dir), serde_json::to_vec(&manifest)?)?;
    Ok(path)
}

fn weather_fixture() -> TestResult<TempDir> {
    let tmp = TempDir::new()?;
    write_partition(
        tmp.path(),
        "weather",
        "a.parquet",
        &[(APR_10_14H + 60_000_000_000, "Oslo", 4.5)],
    )?;
    write_partition(
        tmp.path(),
        "weather",
        "b.parquet",
        &[(APR_10_14H + 2 * HOUR, "Bergen", 7.0)],
    )?;
    Ok(tmp)
}

const HOUR_14_QUERY: &str = "SELECT city, temperature FROM weather \
     WHERE time >= '2025-04-10T14:00:00Z' AND time < '2025-04-10T15:00:00Z'";

#[test]
fn query_prints_json_results_for_overlapping_files_only() -> TestResult {
    let tmp = weather_fixture()?;
    let out = run_cli(tmp.path(), &["query", "--sql", HOUR_14_QUERY])?;
    assert_cli_success(&out);

    let v = stdout_json(&out)?;
    let results = v["results"].as_array().ok_or("results array")?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["city"], "Oslo");
    assert_eq!(results[0]["temperature"], 4.5);
    Ok(())
}

#[test]
fn query_accepts_a_json_request_body() -> TestResult {
    let tmp = weather_fixture()?;
    let body = serde_json::json!({ "query": "SELECT count(*) AS n FROM weather", "db": "default" })
        .to_string();
    let out = run_cli(tmp.path(), &["query", "--request", &body])?;
    assert_cli_success(&out);

    let v = stdout_json(&out)?;
    assert_eq!(v["results"][0]["n"], "2");
    Ok(())
}

#[test]
fn query_renders_a_table() -> TestResult {
    let tmp = weather_fixture()?;
    let out = run_cli(
        tmp.path(),
        &["query", "--sql", HOUR_14_QUERY, "--format", "table"],
    )?;
    assert_cli_success(&out);

    let text = String::from_utf8(out.stdout)?;
    assert!(text.contains("Results"));
    assert!(text.contains("Oslo"));
    assert!(!text.contains("Bergen"));
    assert!(text.contains("total_rows: 1"));
    Ok(())
}

#[test]
fn query_without_matching_files_prints_empty_results() -> TestResult {
    let tmp = weather_fixture()?;
    let out = run_cli(
        tmp.path(),
        &[
            "query",
            "--sql",
            "SELECT * FROM weather WHERE time >= '2024-01-01T00:00:00Z' AND time < '2024-01-02T00:00:00Z'",
        ],
    )?;
    assert_cli_success(&out);
    assert_eq!(stdout_json(&out)?, serde_json::json!({ "results": [] }));
    Ok(())
}

#[test]
fn query_without_statement_fails() -> TestResult {
    let tmp = TempDir::new()?;
    let out = run_cli(tmp.path(), &["query"])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("query"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn malformed_statement_fails() -> TestResult {
    let tmp = TempDir::new()?;
    let out = run_cli(tmp.path(), &["query", "--sql", "DELETE FROM weather"])?;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    Ok(())
}

#[test]
fn invalid_request_body_fails() -> TestResult {
    let tmp = TempDir::new()?;
    let out = run_cli(tmp.path(), &["query", "--request", "{not json"])?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Invalid request body"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn resolve_lists_pruned_files() -> TestResult {
    let tmp = weather_fixture()?;
    let out = run_cli(tmp.path(), &["resolve", "--sql", HOUR_14_QUERY])?;
    assert_cli_success(&out);

    let v = stdout_json(&out)?;
    assert_eq!(v["database"], "default");
    assert_eq!(v["measurement"], "weather");
    assert_eq!(v["strategy"], "hive");
    let files = v["files"].as_array().ok_or("files array")?;
    assert_eq!(files.len(), 1);
    assert!(files[0].as_str().unwrap().ends_with("a.parquet"));
    Ok(())
}

#[test]
fn resolve_reports_missing_measurement() -> TestResult {
    let tmp = TempDir::new()?;
    let out = run_cli(
        tmp.path(),
        &["resolve", "--sql", "SELECT * FROM nowhere", "--format", "table"],
    )?;
    assert_cli_success(&out);
    let text = String::from_utf8(out.stdout)?;
    assert!(text.contains("files: 0"));
    assert!(text.contains("skipped:"));
    Ok(())
}

#[test]
fn sql_runs_verbatim() -> TestResult {
    let tmp = TempDir::new()?;
    let out = run_cli(tmp.path(), &["sql", "--sql", "SELECT 1 AS one"])?;
    assert_cli_success(&out);
    assert_eq!(
        stdout_json(&out)?,
        serde_json::json!({ "results": [{ "one": "1" }] })
    );
    Ok(())
}

#[test]
fn parse_lines_groups_points_by_hour_partition() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("points.lp");
    std::fs::write(
        &input,
        "# sample\n\
         cpu,host=a usage=1.5 1744293600000000000\n\
         cpu,host=b usage=2i 1744297200000000000\n\
         cpu,host=a usage=3 1744293660000000000\n",
    )?;

    let out = run_cli(
        tmp.path(),
        &["parse-lines", "--input", input.to_str().ok_or("utf8 path")?],
    )?;
    assert_cli_success(&out);

    let v = stdout_json(&out)?;
    let groups = v.as_array().ok_or("array")?;
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["partition"], "date=2025-04-10/hour=14");
    assert_eq!(groups[0]["points"].as_array().unwrap().len(), 2);
    assert_eq!(groups[0]["min_time"], 1_744_293_600_000_000_000_i64);
    assert_eq!(groups[0]["max_time"], 1_744_293_660_000_000_000_i64);
    assert_eq!(groups[1]["partition"], "date=2025-04-10/hour=15");
    assert_eq!(groups[1]["points"][0]["fields"]["usage"], 2);
    assert_eq!(groups[1]["points"][0]["tags"]["host"], "b");
    Ok(())
}

#[test]
fn parse_lines_reads_stdin() -> TestResult {
    let tmp = TempDir::new()?;
    let mut child = Command::new(cli_bin())
        .args(["parse-lines", "--format", "table"])
        .current_dir(tmp.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    child
        .stdin
        .take()
        .ok_or("stdin")?
        .write_all(b"mem,host=a used=10i 1744293600000000000\n")?;
    let out = child.wait_with_output()?;
    assert_cli_success(&out);

    let text = String::from_utf8(out.stdout)?;
    assert!(text.contains("Partitions"));
    assert!(text.contains("mem"));
    assert!(text.contains("date=2025-04-10/hour=14"));
    Ok(())
}

#[test]
fn parse_lines_rejects_bad_input() -> TestResult {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("bad.lp");
    std::fs::write(&input, "cpu,host=a\n")?;
    let out = run_cli(
        tmp.path(),
        &["parse-lines", "--input", input.to_str().ok_or("utf8 path")?],
    )?;
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("Invalid line protocol"), "stderr: {stderr}");
    Ok(())
}
