use std::ops::Range;

use serde::Serialize;

use crate::interval::TimeBounds;

/// Time predicate extracted from a `WHERE` clause.
///
/// `start` and `end` are both `None` when the statement carries no usable time
/// predicate: nothing can be pruned and every file must be considered. When a
/// predicate was found they are both set (a missing lower bound defaults to
/// the epoch, a missing upper bound to the extraction instant).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    /// Inclusive lower bound in epoch nanoseconds.
    pub start: Option<i64>,
    /// Inclusive upper bound in epoch nanoseconds.
    pub end: Option<i64>,
    /// Original text of every time conjunct, joined with `AND`.
    pub condition_text: Option<String>,
}

impl TimeRange {
    /// A range with no predicate.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// The pruning bounds, when both ends are known.
    pub fn bounds(&self) -> Option<TimeBounds> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(TimeBounds::new(start, end)),
            _ => None,
        }
    }
}

/// Typed view of one `SELECT` statement.
///
/// Clause bodies are kept as the original text; the core only interprets the
/// table reference, the time predicate and `LIMIT`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    /// The statement as received.
    pub source: String,
    /// Projection text, `*` when empty.
    pub columns: String,
    /// Database name (explicit qualifier or the fallback).
    pub database: String,
    /// Measurement (table) name.
    pub measurement: String,
    /// Alias given to the table in `FROM`, as written (quotes included).
    pub table_alias: Option<String>,
    /// Byte span of the `[database.]measurement` reference in `source`.
    #[serde(skip)]
    pub table_span: Range<usize>,
    /// Extracted time predicate.
    pub time_range: TimeRange,
    /// `WHERE` conjuncts that are not time predicates, joined with `AND`.
    pub where_conditions: Option<String>,
    /// `GROUP BY` body.
    pub group_by: Option<String>,
    /// `HAVING` body.
    pub having: Option<String>,
    /// `ORDER BY` body.
    pub order_by: Option<String>,
    /// `LIMIT` row count.
    pub limit: Option<u64>,
    /// `OFFSET` that followed `LIMIT`.
    pub offset: Option<u64>,
}

impl QueryDescriptor {
    /// Statement text before the table reference.
    pub fn text_before_table(&self) -> &str {
        &self.source[..self.table_span.start]
    }

    /// Statement text after the table reference, without a trailing `;`.
    pub fn text_after_table(&self) -> &str {
        self.source[self.table_span.end..]
            .trim_end()
            .trim_end_matches(';')
            .trim_end()
    }
}
