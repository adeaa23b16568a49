use std::io::Write;

use hivets_core::{line_protocol::PartitionBatch, resolve::Resolution, sql::QueryDescriptor};
use hivets_datafusion::{QueryResponse, Row};
use serde::Serialize;
use snafu::ResultExt;
use tabled::{
    builder::Builder,
    settings::{Style, object::Rows, style::LineText, width::MinWidth},
};

use crate::error::{CliResult, EncodeSnafu, WriteOutputSnafu};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

fn render_table(label: &str, columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    const LABEL_OFFSET: usize = 6;
    let min_width = LABEL_OFFSET + label.len() + 4;

    let mut builder = Builder::default();
    builder.push_record(columns);
    for row in rows {
        builder.push_record(row);
    }

    let mut table = builder.build();

    table.with(Style::rounded());
    table.with(MinWidth::new(min_width));
    table.with(LineText::new(label, Rows::first()).offset(LABEL_OFFSET));
    // LineText re-estimates dimensions, so re-apply MinWidth afterwards.
    table.with(MinWidth::new(min_width));
    table.to_string()
}

fn write_json<W: Write, T: Serialize>(value: &T, out: &mut W) -> CliResult<()> {
    serde_json::to_writer_pretty(&mut *out, value).context(EncodeSnafu)?;
    writeln!(out).context(WriteOutputSnafu)
}

/// Column order: the engine's when known, otherwise the first row's.
fn columns_of(columns: &[String], rows: &[Row]) -> Vec<String> {
    let mut out: Vec<String> = match rows.first() {
        Some(first) => first.column_names().map(str::to_string).collect(),
        None => columns.to_vec(),
    };
    // Normalization may add `<col>_iso` siblings the engine never reported.
    for c in columns {
        if !out.contains(c) {
            out.push(c.clone());
        }
    }
    out
}

pub fn write_rows<W: Write>(
    columns: &[String],
    rows: &[Row],
    format: OutputFormat,
    max_rows: usize,
    out: &mut W,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(
            &QueryResponse {
                results: rows.to_vec(),
            },
            out,
        ),
        OutputFormat::Table => {
            let columns = columns_of(columns, rows);
            let preview: Vec<Vec<String>> = rows
                .iter()
                .take(max_rows)
                .map(|r| {
                    columns
                        .iter()
                        .map(|c| r.get(c).map(ToString::to_string).unwrap_or_default())
                        .collect()
                })
                .collect();

            let rendered = render_table("Results", &columns, &preview);
            if !rendered.is_empty() {
                writeln!(out, "{rendered}").context(WriteOutputSnafu)?;
            }
            if rows.is_empty() {
                writeln!(out, "(no rows)").context(WriteOutputSnafu)?;
            }
            writeln!(out, "total_rows: {}", rows.len()).context(WriteOutputSnafu)
        }
    }
}

#[derive(Serialize)]
struct ResolveReport<'a> {
    database: &'a str,
    measurement: &'a str,
    time_range: &'a hivets_core::sql::TimeRange,
    #[serde(flatten)]
    resolution: &'a Resolution,
}

pub fn write_resolution<W: Write>(
    descriptor: &QueryDescriptor,
    resolution: &Resolution,
    format: OutputFormat,
    out: &mut W,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => write_json(
            &ResolveReport {
                database: &descriptor.database,
                measurement: &descriptor.measurement,
                time_range: &descriptor.time_range,
                resolution,
            },
            out,
        ),
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = resolution
                .files
                .iter()
                .map(|p| vec![p.display().to_string()])
                .collect();
            let rendered = render_table("Resolved files", &["path".to_string()], &rows);
            writeln!(out, "{rendered}").context(WriteOutputSnafu)?;
            writeln!(
                out,
                "strategy: {:?}, files: {}, skipped: {}",
                resolution.strategy,
                resolution.files.len(),
                resolution.skipped.len()
            )
            .context(WriteOutputSnafu)?;
            for s in &resolution.skipped {
                writeln!(out, "skipped: {s}").context(WriteOutputSnafu)?;
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct PartitionReport<'a> {
    measurement: &'a str,
    partition: String,
    min_time: i64,
    max_time: i64,
    points: &'a [hivets_core::line_protocol::Point],
}

pub fn write_partitions<W: Write>(
    batches: &[PartitionBatch],
    format: OutputFormat,
    out: &mut W,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let reports: Vec<PartitionReport<'_>> = batches
                .iter()
                .map(|b| PartitionReport {
                    measurement: &b.measurement,
                    partition: b.partition.rel_dir().display().to_string(),
                    min_time: b.min_time,
                    max_time: b.max_time,
                    points: &b.points,
                })
                .collect();
            write_json(&reports, out)
        }
        OutputFormat::Table => {
            let columns = ["measurement", "partition", "points", "min_time", "max_time"]
                .map(String::from)
                .to_vec();
            let rows: Vec<Vec<String>> = batches
                .iter()
                .map(|b| {
                    vec![
                        b.measurement.clone(),
                        b.partition.rel_dir().display().to_string(),
                        b.points.len().to_string(),
                        b.min_time.to_string(),
                        b.max_time.to_string(),
                    ]
                })
                .collect();
            writeln!(out, "{}", render_table("Partitions", &columns, &rows))
                .context(WriteOutputSnafu)
        }
    }
}

#[cfg(test)]
mod tests {
    use hivets_datafusion::CellValue;

    use super::*;

    fn sample() -> Vec<Row> {
        vec![
            Row::new(vec![
                ("city".into(), CellValue::Text("Oslo".into())),
                ("temp".into(), CellValue::Float64(4.5)),
            ]),
            Row::new(vec![
                ("city".into(), CellValue::Text("Bergen".into())),
                ("temp".into(), CellValue::Null),
            ]),
        ]
    }

    #[test]
    fn table_output_has_header_rows_and_summary() {
        let mut buf = Vec::new();
        write_rows(
            &["city".into(), "temp".into()],
            &sample(),
            OutputFormat::Table,
            10,
            &mut buf,
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Results"));
        assert!(text.contains("Oslo"));
        assert!(text.contains("NULL"));
        assert!(text.contains("total_rows: 2"));
    }

    #[test]
    fn table_preview_respects_max_rows() {
        let mut buf = Vec::new();
        write_rows(&[], &sample(), OutputFormat::Table, 1, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Oslo"));
        assert!(!text.contains("Bergen"));
        assert!(text.contains("total_rows: 2"));
    }

    #[test]
    fn empty_results_say_so() {
        let mut buf = Vec::new();
        write_rows(&[], &[], OutputFormat::Table, 10, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "(no rows)\ntotal_rows: 0\n");
    }

    #[test]
    fn json_output_is_the_wire_response() {
        let mut buf = Vec::new();
        write_rows(&[], &sample(), OutputFormat::Json, 0, &mut buf).unwrap();
        let v: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(v["results"][0]["city"], "Oslo");
        assert!(v["results"][1]["temp"].is_null());
    }
}
