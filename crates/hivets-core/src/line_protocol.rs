//! Decoder for inbound points at the ingestion boundary.
//!
//! ```text
//! measurement[,tag=value...] field=value[,field=value...] [timestamp]
//! ```
//!
//! Measurement names, tag keys/values and field keys may escape `,`, `=`,
//! space and `\` with a backslash. String fields are double-quoted and escape
//! `"` and `\`. Field values decode as:
//!
//! - integer: digits with an `i` suffix (`42i`)
//! - boolean: `t`, `f`, `true`, `false` in any case
//! - string: `"..."`
//! - float: everything else
//!
//! A missing timestamp is "now" in epoch nanoseconds.
//!
//! Only decoding and partition assignment live here. Writing the grouped
//! points to Parquet and updating the partition manifest belongs to a writer
//! component that is not part of this crate.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::Serialize;
use snafu::prelude::*;

use crate::{
    interval::{date_and_hour, now_nanos},
    layout,
};

/// Errors decoding one line.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum LineProtocolError {
    /// The line has no measurement name.
    #[snafu(display("line {line}: missing measurement"))]
    MissingMeasurement {
        /// 1-based line number.
        line: usize,
    },

    /// The line has no field set.
    #[snafu(display("line {line}: at least one field is required"))]
    MissingFields {
        /// 1-based line number.
        line: usize,
    },

    /// A `key=value` pair is missing its `=` or one of its sides.
    #[snafu(display("line {line}: malformed pair '{pair}'"))]
    MalformedPair {
        /// 1-based line number.
        line: usize,
        /// The offending text.
        pair: String,
    },

    /// A quoted string field without its closing quote.
    #[snafu(display("line {line}: unterminated string field"))]
    UnterminatedString {
        /// 1-based line number.
        line: usize,
    },

    /// A field value that is neither integer, boolean, string nor float.
    #[snafu(display("line {line}: invalid value '{value}' for field {field}"))]
    InvalidFieldValue {
        /// 1-based line number.
        line: usize,
        /// Field key.
        field: String,
        /// Raw value text.
        value: String,
    },

    /// The trailing timestamp is not an integer.
    #[snafu(display("line {line}: invalid timestamp '{value}'"))]
    InvalidTimestamp {
        /// 1-based line number.
        line: usize,
        /// Raw timestamp text.
        value: String,
    },
}

/// Result alias for line-protocol decoding.
pub type LineProtocolResult<T> = Result<T, LineProtocolError>;

/// A decoded field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// `42i`
    Integer(i64),
    /// Default numeric form.
    Float(f64),
    /// `t`, `true`, `F`, ...
    Boolean(bool),
    /// `"text"`
    String(String),
}

/// One decoded point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Point {
    /// Measurement (table) name.
    pub measurement: String,
    /// Tag set, ordered by key.
    pub tags: BTreeMap<String, String>,
    /// Field set, ordered by key.
    pub fields: BTreeMap<String, FieldValue>,
    /// Epoch nanoseconds.
    pub timestamp: i64,
}

/// The `date=/hour=` partition covering an instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    /// UTC calendar date.
    pub date: NaiveDate,
    /// UTC hour of day.
    pub hour: u32,
}

impl PartitionKey {
    /// Partition that covers `timestamp` (epoch nanoseconds).
    pub fn for_timestamp(timestamp: i64) -> Self {
        let (date, hour) = date_and_hour(timestamp);
        Self { date, hour }
    }

    /// `date=YYYY-MM-DD/hour=HH`
    pub fn rel_dir(&self) -> PathBuf {
        layout::partition_rel_dir(self.date, self.hour)
    }

    /// Partition directory of `measurement_dir`.
    pub fn dir_under(&self, measurement_dir: &Path) -> PathBuf {
        measurement_dir.join(self.rel_dir())
    }
}

/// Points of one measurement that fall into one partition.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionBatch {
    /// Measurement name.
    pub measurement: String,
    /// Covering partition.
    pub partition: PartitionKey,
    /// Points in input order.
    pub points: Vec<Point>,
    /// Earliest timestamp in `points`.
    pub min_time: i64,
    /// Latest timestamp in `points`.
    pub max_time: i64,
}

/// Decode every non-empty, non-comment line of `input`.
pub fn parse_lines(input: &str) -> LineProtocolResult<Vec<Point>> {
    parse_lines_at(input, now_nanos())
}

/// Like [`parse_lines`] with an explicit default timestamp.
pub fn parse_lines_at(input: &str, default_ts: i64) -> LineProtocolResult<Vec<Point>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, l)| {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|(idx, l)| parse_line(l.trim(), idx + 1, default_ts))
        .collect()
}

/// Group points by `(measurement, partition)`, ordered by measurement then time.
pub fn group_by_partition(points: Vec<Point>) -> Vec<PartitionBatch> {
    let mut groups: BTreeMap<(String, PartitionKey), PartitionBatch> = BTreeMap::new();
    for p in points {
        let partition = PartitionKey::for_timestamp(p.timestamp);
        let batch = groups
            .entry((p.measurement.clone(), partition))
            .or_insert_with(|| PartitionBatch {
                measurement: p.measurement.clone(),
                partition,
                points: Vec::new(),
                min_time: p.timestamp,
                max_time: p.timestamp,
            });
        batch.min_time = batch.min_time.min(p.timestamp);
        batch.max_time = batch.max_time.max(p.timestamp);
        batch.points.push(p);
    }
    groups.into_values().collect()
}

/// Split `s` on unescaped, unquoted occurrences of `sep`.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            c if c == sep && !quoted => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Split off the first unescaped `=`.
fn split_pair(s: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' {
            return Some((&s[..i], &s[i + 1..]));
        }
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(n @ (',' | '=' | ' ' | '\\' | '"')) => out.push(n),
                Some(n) => {
                    out.push('\\');
                    out.push(n);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_field_value(raw: &str, field: &str, line: usize) -> LineProtocolResult<FieldValue> {
    if let Some(inner) = raw.strip_prefix('"') {
        let inner = inner
            .strip_suffix('"')
            .filter(|_| raw.len() >= 2)
            .context(UnterminatedStringSnafu { line })?;
        return Ok(FieldValue::String(unescape(inner)));
    }

    match raw.to_ascii_lowercase().as_str() {
        "t" | "true" => return Ok(FieldValue::Boolean(true)),
        "f" | "false" => return Ok(FieldValue::Boolean(false)),
        _ => {}
    }

    let invalid = || InvalidFieldValueSnafu {
        line,
        field,
        value: raw,
    };

    if let Some(digits) = raw.strip_suffix('i') {
        return digits
            .parse::<i64>()
            .map(FieldValue::Integer)
            .ok()
            .context(invalid());
    }

    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(FieldValue::Float)
        .context(invalid())
}

fn parse_line(text: &str, line: usize, default_ts: i64) -> LineProtocolResult<Point> {
    // Sections are separated by unescaped, unquoted spaces.
    let sections: Vec<&str> = split_unescaped(text, ' ')
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

    let (head, field_set, ts) = match sections.as_slice() {
        [head, fields] => (*head, *fields, None),
        [head, fields, ts] => (*head, *fields, Some(*ts)),
        [_] => return MissingFieldsSnafu { line }.fail(),
        _ => {
            return MalformedPairSnafu {
                line,
                pair: text.to_string(),
            }
            .fail();
        }
    };

    let mut head_parts = split_unescaped(head, ',').into_iter();
    let measurement = head_parts
        .next()
        .filter(|m| !m.is_empty())
        .map(unescape)
        .context(MissingMeasurementSnafu { line })?;

    let mut tags = BTreeMap::new();
    for pair in head_parts {
        let (k, v) = split_pair(pair)
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .context(MalformedPairSnafu { line, pair })?;
        tags.insert(unescape(k), unescape(v));
    }

    let mut fields = BTreeMap::new();
    for pair in split_unescaped(field_set, ',') {
        let (k, v) = split_pair(pair)
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .context(MalformedPairSnafu { line, pair })?;
        let key = unescape(k);
        let value = parse_field_value(v, &key, line)?;
        fields.insert(key, value);
    }

    let timestamp = match ts {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .context(InvalidTimestampSnafu { line, value: raw })?,
        None => default_ts,
    };

    Ok(Point {
        measurement,
        tags,
        fields,
        timestamp,
    })
}
