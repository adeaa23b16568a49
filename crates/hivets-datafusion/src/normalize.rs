//! Typed result rows and their wire normalization.
//!
//! Arrow batches are decoded into [`Row`]s of [`CellValue`]s, then
//! [`normalize_row`] rewrites values that do not survive JSON intact:
//!
//! | value                         | becomes                                   |
//! |-------------------------------|-------------------------------------------|
//! | 64/128-bit integer            | decimal text                              |
//! | null in a `*count*` column    | `0`                                       |
//! | binary                        | UTF-8 text (lossy)                        |
//! | integer in a `time` column    | unchanged, plus `time_iso`                |
//! | timestamp or date             | nanosecond text, plus `<column>_iso`      |
//!
//! Normalizing a normalized row changes nothing.

use std::fmt;

use arrow::{
    array::{Array, AsArray},
    datatypes::{
        DataType, Date32Type, Date64Type, Float16Type, Float32Type, Float64Type, Int8Type,
        Int16Type, Int32Type, Int64Type, TimeUnit, TimestampMicrosecondType,
        TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type,
        UInt16Type, UInt32Type, UInt64Type,
    },
    error::ArrowError,
    record_batch::RecordBatch,
    util::display::{ArrayFormatter, FormatOptions},
};
use chrono::SecondsFormat;
use hivets_core::interval::nanos_to_utc;
use log::warn;
use serde::{
    Serialize, Serializer,
    ser::{SerializeMap, SerializeSeq},
};
use snafu::Snafu;

const TIME_COLUMN: &str = "time";
const ISO_SUFFIX: &str = "_iso";
const NANOS_PER_MILLI: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

/// Resolution of a [`CellValue::Timestamp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampUnit {
    /// Seconds.
    Second,
    /// Milliseconds.
    Millisecond,
    /// Microseconds.
    Microsecond,
    /// Nanoseconds.
    Nanosecond,
}

impl TimestampUnit {
    fn nanos_per_unit(self) -> i64 {
        match self {
            TimestampUnit::Second => 1_000_000_000,
            TimestampUnit::Millisecond => 1_000_000,
            TimestampUnit::Microsecond => 1_000,
            TimestampUnit::Nanosecond => 1,
        }
    }

    /// Convert `value` in this unit to epoch nanoseconds.
    pub fn to_nanos(self, value: i64) -> Option<i64> {
        value.checked_mul(self.nanos_per_unit())
    }
}

impl From<&TimeUnit> for TimestampUnit {
    fn from(unit: &TimeUnit) -> Self {
        match unit {
            TimeUnit::Second => TimestampUnit::Second,
            TimeUnit::Millisecond => TimestampUnit::Millisecond,
            TimeUnit::Microsecond => TimestampUnit::Microsecond,
            TimeUnit::Nanosecond => TimestampUnit::Nanosecond,
        }
    }
}

/// One result value.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Boolean(bool),
    /// Integer of 32 bits or fewer; JSON-safe as a number.
    Integer(i64),
    /// 64-bit or wider integer, signed or unsigned.
    Integer64(i128),
    /// Floating point of any width.
    Float64(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Instant since the epoch; dates are midnight UTC.
    Timestamp {
        /// Count of `unit`s since the epoch.
        value: i64,
        /// Resolution of `value`.
        unit: TimestampUnit,
    },
    /// List elements.
    List(Vec<CellValue>),
    /// Struct fields in schema order.
    Struct(Vec<(String, CellValue)>),
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Boolean(b) => serializer.serialize_bool(*b),
            CellValue::Integer(i) => serializer.serialize_i64(*i),
            CellValue::Integer64(i) => serializer.serialize_str(&i.to_string()),
            CellValue::Float64(f) => serializer.serialize_f64(*f),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            CellValue::Timestamp { value, unit } => match unit.to_nanos(*value) {
                Some(ns) => serializer.serialize_str(&ns.to_string()),
                None => serializer.serialize_none(),
            },
            CellValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            CellValue::Struct(fields) => serialize_pairs(fields, serializer),
        }
    }
}

fn serialize_pairs<S: Serializer>(
    pairs: &[(String, CellValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (k, v) in pairs {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

/// One result row; columns keep the engine's output order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, CellValue)>,
}

impl Row {
    /// Row from `(column, value)` pairs.
    pub fn new(columns: Vec<(String, CellValue)>) -> Self {
        Self { columns }
    }

    /// Value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns.iter().map(|(name, v)| (name.as_str(), v))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_pairs(&self.columns, serializer)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Boolean(b) => write!(f, "{b}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Integer64(i) => write!(f, "{i}"),
            CellValue::Float64(v) => write!(f, "{v}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            CellValue::Timestamp { value, unit } => match unit.to_nanos(*value) {
                Some(ns) => write!(f, "{ns}"),
                None => write!(f, "{value} ({unit:?})"),
            },
            CellValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            CellValue::Struct(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// A row that could not be normalized.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum NormalizeError {
    /// A timestamp cannot be expressed in epoch nanoseconds.
    #[snafu(display("timestamp {value} ({unit:?}) in column {column} overflows nanoseconds"))]
    TimestampOverflow {
        /// Column holding the value.
        column: String,
        /// Raw value.
        value: i64,
        /// Its unit.
        unit: TimestampUnit,
    },
}

/// ISO-8601 text of the millisecond containing `nanos`.
fn iso(nanos: i64) -> String {
    let millis = nanos
        .checked_sub(nanos.rem_euclid(NANOS_PER_MILLI))
        .unwrap_or(nanos);
    nanos_to_utc(millis).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Rewrite a nested value for the wire, without sibling columns.
fn normalize_nested(column: &str, value: CellValue) -> Result<CellValue, NormalizeError> {
    Ok(match value {
        CellValue::Integer64(i) => CellValue::Text(i.to_string()),
        CellValue::Bytes(b) => CellValue::Text(String::from_utf8_lossy(&b).into_owned()),
        CellValue::Timestamp { value, unit } => {
            let ns = unit
                .to_nanos(value)
                .ok_or_else(|| NormalizeError::TimestampOverflow {
                    column: column.to_string(),
                    value,
                    unit,
                })?;
            CellValue::Text(ns.to_string())
        }
        CellValue::List(items) => CellValue::List(
            items
                .into_iter()
                .map(|v| normalize_nested(column, v))
                .collect::<Result<_, _>>()?,
        ),
        CellValue::Struct(fields) => CellValue::Struct(
            fields
                .into_iter()
                .map(|(k, v)| normalize_nested(column, v).map(|v| (k, v)))
                .collect::<Result<_, _>>()?,
        ),
        other => other,
    })
}

/// Normalize one row for JSON transport.
pub fn normalize_row(row: &Row) -> Result<Row, NormalizeError> {
    let mut out: Vec<(String, CellValue)> = Vec::with_capacity(row.columns.len() + 1);

    for (name, value) in &row.columns {
        let mut sibling = None;
        let value = match value {
            CellValue::Null if name.to_ascii_lowercase().contains("count") => CellValue::Integer(0),
            CellValue::Timestamp { value, unit } => {
                let ns = unit
                    .to_nanos(*value)
                    .ok_or_else(|| NormalizeError::TimestampOverflow {
                        column: name.clone(),
                        value: *value,
                        unit: *unit,
                    })?;
                sibling = Some(CellValue::Text(iso(ns)));
                CellValue::Text(ns.to_string())
            }
            CellValue::Integer(ns) if name == TIME_COLUMN => {
                sibling = Some(CellValue::Text(iso(*ns)));
                CellValue::Integer(*ns)
            }
            CellValue::Integer64(ns) if name == TIME_COLUMN => {
                if let Ok(ns) = i64::try_from(*ns) {
                    sibling = Some(CellValue::Text(iso(ns)));
                }
                CellValue::Text(ns.to_string())
            }
            other => normalize_nested(name, other.clone())?,
        };

        out.push((name.clone(), value));
        if let Some(iso_value) = sibling {
            let iso_name = format!("{name}{ISO_SUFFIX}");
            if !row.columns.iter().any(|(n, _)| *n == iso_name) {
                out.push((iso_name, iso_value));
            }
        }
    }

    Ok(Row::new(out))
}

/// Normalize every row; rows that fail are logged and passed through as-is.
pub fn normalize_rows(rows: Vec<Row>) -> Vec<Row> {
    rows.into_iter()
        .map(|row| match normalize_row(&row) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("row left unnormalized: {e}");
                row
            }
        })
        .collect()
}

/// Decode result batches into rows.
pub fn rows_from_batches(batches: &[RecordBatch]) -> Result<Vec<Row>, ArrowError> {
    let mut rows = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
    for batch in batches {
        let schema = batch.schema();
        for idx in 0..batch.num_rows() {
            let mut columns = Vec::with_capacity(batch.num_columns());
            for (field, array) in schema.fields().iter().zip(batch.columns()) {
                columns.push((field.name().to_string(), cell_at(array.as_ref(), idx)?));
            }
            rows.push(Row::new(columns));
        }
    }
    Ok(rows)
}

/// Decode the value at `idx` of `array`.
pub fn cell_at(array: &dyn Array, idx: usize) -> Result<CellValue, ArrowError> {
    if array.is_null(idx) {
        return Ok(CellValue::Null);
    }

    let value = match array.data_type() {
        DataType::Null => CellValue::Null,
        DataType::Boolean => CellValue::Boolean(array.as_boolean().value(idx)),

        DataType::Int8 => {
            CellValue::Integer(i64::from(array.as_primitive::<Int8Type>().value(idx)))
        }
        DataType::Int16 => {
            CellValue::Integer(i64::from(array.as_primitive::<Int16Type>().value(idx)))
        }
        DataType::Int32 => {
            CellValue::Integer(i64::from(array.as_primitive::<Int32Type>().value(idx)))
        }
        DataType::UInt8 => {
            CellValue::Integer(i64::from(array.as_primitive::<UInt8Type>().value(idx)))
        }
        DataType::UInt16 => {
            CellValue::Integer(i64::from(array.as_primitive::<UInt16Type>().value(idx)))
        }
        DataType::UInt32 => {
            CellValue::Integer(i64::from(array.as_primitive::<UInt32Type>().value(idx)))
        }
        DataType::Int64 => {
            CellValue::Integer64(i128::from(array.as_primitive::<Int64Type>().value(idx)))
        }
        DataType::UInt64 => {
            CellValue::Integer64(i128::from(array.as_primitive::<UInt64Type>().value(idx)))
        }

        DataType::Float16 => {
            CellValue::Float64(array.as_primitive::<Float16Type>().value(idx).to_f64())
        }
        DataType::Float32 => {
            CellValue::Float64(f64::from(array.as_primitive::<Float32Type>().value(idx)))
        }
        DataType::Float64 => CellValue::Float64(array.as_primitive::<Float64Type>().value(idx)),

        DataType::Utf8 => CellValue::Text(array.as_string::<i32>().value(idx).to_string()),
        DataType::LargeUtf8 => CellValue::Text(array.as_string::<i64>().value(idx).to_string()),
        DataType::Utf8View => CellValue::Text(array.as_string_view().value(idx).to_string()),

        DataType::Binary => CellValue::Bytes(array.as_binary::<i32>().value(idx).to_vec()),
        DataType::LargeBinary => CellValue::Bytes(array.as_binary::<i64>().value(idx).to_vec()),
        DataType::BinaryView => CellValue::Bytes(array.as_binary_view().value(idx).to_vec()),
        DataType::FixedSizeBinary(_) => {
            CellValue::Bytes(array.as_fixed_size_binary().value(idx).to_vec())
        }

        DataType::Timestamp(unit, _) => {
            let value = match unit {
                TimeUnit::Second => array.as_primitive::<TimestampSecondType>().value(idx),
                TimeUnit::Millisecond => {
                    array.as_primitive::<TimestampMillisecondType>().value(idx)
                }
                TimeUnit::Microsecond => {
                    array.as_primitive::<TimestampMicrosecondType>().value(idx)
                }
                TimeUnit::Nanosecond => array.as_primitive::<TimestampNanosecondType>().value(idx),
            };
            CellValue::Timestamp {
                value,
                unit: unit.into(),
            }
        }
        DataType::Date32 => CellValue::Timestamp {
            value: i64::from(array.as_primitive::<Date32Type>().value(idx)) * SECONDS_PER_DAY,
            unit: TimestampUnit::Second,
        },
        DataType::Date64 => CellValue::Timestamp {
            value: array.as_primitive::<Date64Type>().value(idx),
            unit: TimestampUnit::Millisecond,
        },

        DataType::List(_) => list_cells(array.as_list::<i32>().value(idx).as_ref())?,
        DataType::LargeList(_) => list_cells(array.as_list::<i64>().value(idx).as_ref())?,
        DataType::Struct(fields) => {
            let s = array.as_struct();
            let mut out = Vec::with_capacity(fields.len());
            for (field, column) in fields.iter().zip(s.columns()) {
                out.push((field.name().to_string(), cell_at(column.as_ref(), idx)?));
            }
            CellValue::Struct(out)
        }

        _ => {
            let options = FormatOptions::default();
            let formatter = ArrayFormatter::try_new(array, &options)?;
            CellValue::Text(formatter.value(idx).try_to_string()?)
        }
    };
    Ok(value)
}

fn list_cells(values: &dyn Array) -> Result<CellValue, ArrowError> {
    (0..values.len())
        .map(|i| cell_at(values, i))
        .collect::<Result<Vec<_>, _>>()
        .map(CellValue::List)
}
