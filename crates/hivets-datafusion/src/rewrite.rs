//! Statement rewriting over a Resolved File Set.
//!
//! The logical `[db.]measurement` reference is replaced with a uniquely named
//! virtual relation that the engine registers over the resolved files for the
//! duration of one execution. Two strategies are available:
//!
//! - [`RewriteStrategy::ClauseReconstruction`] rebuilds the statement from the
//!   descriptor's clause bodies in canonical order.
//! - [`RewriteStrategy::TextualSubstitution`] splices the relation name into
//!   the original text at the table reference's span.
//!
//! Both quote bare ISO-8601 literals so the engine parses them as strings.

use std::{
    collections::HashSet,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use hivets_core::sql::{QueryDescriptor, requote_datetime_literals};
use log::info;

static NEXT_RELATION_ID: AtomicU64 = AtomicU64::new(0);

/// How a statement is rebuilt around the virtual relation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RewriteStrategy {
    /// Rebuild `SELECT .. FROM .. WHERE .. GROUP BY .. HAVING .. ORDER BY .. LIMIT ..`.
    #[default]
    ClauseReconstruction,
    /// Replace only the table reference in the original text.
    TextualSubstitution,
}

/// A query-time relation over an explicit file list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualRelation {
    /// Name the relation is registered under.
    pub name: String,
    /// Distinct files, in resolution order.
    pub files: Vec<PathBuf>,
}

impl VirtualRelation {
    /// Allocate a fresh relation name for `measurement` over `files`.
    pub fn new(measurement: &str, files: &[PathBuf]) -> Self {
        let id = NEXT_RELATION_ID.fetch_add(1, Ordering::Relaxed);
        let mut seen = HashSet::with_capacity(files.len());
        let files = files
            .iter()
            .filter(|p| seen.insert(p.as_path()))
            .cloned()
            .collect();
        Self {
            name: format!("{}__q{id}", sanitize_identifier(measurement)),
            files,
        }
    }

    /// The relation name as a quoted SQL identifier.
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name)
    }
}

/// Outcome of rewriting one statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewrite {
    /// Nothing to scan; the result is empty without touching the engine.
    NoMatchingFiles,
    /// A statement to run against `relation`.
    Statement {
        /// Executable SQL.
        sql: String,
        /// Relation the statement reads from.
        relation: VirtualRelation,
    },
}

/// Rewrite `descriptor` to read from the resolved `files`.
pub fn rewrite(
    descriptor: &QueryDescriptor,
    files: &[PathBuf],
    strategy: RewriteStrategy,
) -> Rewrite {
    if files.is_empty() {
        info!(
            "{}.{}: no files overlap the query, skipping execution",
            descriptor.database, descriptor.measurement
        );
        return Rewrite::NoMatchingFiles;
    }

    let relation = VirtualRelation::new(&descriptor.measurement, files);
    let sql = match strategy {
        RewriteStrategy::ClauseReconstruction => reconstruct(descriptor, &relation),
        RewriteStrategy::TextualSubstitution => substitute(descriptor, &relation),
    };
    let sql = requote_datetime_literals(&sql);

    info!(
        "{}.{}: {} file(s) as {}",
        descriptor.database,
        descriptor.measurement,
        relation.files.len(),
        relation.name
    );
    Rewrite::Statement { sql, relation }
}

fn reconstruct(d: &QueryDescriptor, relation: &VirtualRelation) -> String {
    let mut sql = format!("SELECT {} FROM {}", d.columns, relation.quoted_name());

    if let Some(alias) = &d.table_alias {
        sql.push_str(" AS ");
        sql.push_str(alias);
    }

    let predicates: Vec<&str> = [
        d.time_range.condition_text.as_deref(),
        d.where_conditions.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    for (keyword, body) in [
        ("GROUP BY", &d.group_by),
        ("HAVING", &d.having),
        ("ORDER BY", &d.order_by),
    ] {
        if let Some(body) = body {
            sql.push(' ');
            sql.push_str(keyword);
            sql.push(' ');
            sql.push_str(body);
        }
    }

    if let Some(limit) = d.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
        if let Some(offset) = d.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }
    }
    sql
}

fn substitute(d: &QueryDescriptor, relation: &VirtualRelation) -> String {
    format!(
        "{}{}{}",
        d.text_before_table(),
        relation.quoted_name(),
        d.text_after_table()
    )
}

/// Reduce `raw` to `[a-z0-9_]`, starting with a letter.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if out.is_empty() {
        return "t".to_string();
    }

    if out.chars().next().is_some_and(|ch| !ch.is_ascii_alphabetic()) {
        out = format!("t_{out}");
    }

    out.make_ascii_lowercase();
    out
}

/// Double-quote `name`, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivets_core::sql::extract_at;

    const NOW: i64 = 1_800_000_000_000_000_000;

    fn files() -> Vec<PathBuf> {
        vec![PathBuf::from("/data/a.parquet")]
    }

    fn statement(sql: &str, strategy: RewriteStrategy) -> (String, VirtualRelation) {
        let d = extract_at(sql, "default", NOW).unwrap();
        match rewrite(&d, &files(), strategy) {
            Rewrite::Statement { sql, relation } => (sql, relation),
            Rewrite::NoMatchingFiles => panic!("expected a statement"),
        }
    }

    #[test]
    fn empty_file_set_short_circuits() {
        let d = extract_at("SELECT * FROM weather", "default", NOW).unwrap();
        assert_eq!(
            rewrite(&d, &[], RewriteStrategy::default()),
            Rewrite::NoMatchingFiles
        );
    }

    #[test]
    fn reconstruction_keeps_every_clause() {
        let (sql, rel) = statement(
            "SELECT city, avg(temp) FROM db.weather w \
             WHERE time >= 2025-04-10T14:00:00 AND city <> 'x' \
             GROUP BY city HAVING avg(temp) > 1 ORDER BY city LIMIT 5 OFFSET 2;",
            RewriteStrategy::ClauseReconstruction,
        );
        let q = rel.quoted_name();
        assert_eq!(
            sql,
            format!(
                "SELECT city, avg(temp) FROM {q} AS w \
                 WHERE time >= '2025-04-10T14:00:00' AND city <> 'x' \
                 GROUP BY city HAVING avg(temp) > 1 ORDER BY city LIMIT 5 OFFSET 2"
            )
        );
    }

    #[test]
    fn reconstruction_without_where() {
        let (sql, rel) = statement("SELECT * FROM weather", RewriteStrategy::default());
        assert_eq!(sql, format!("SELECT * FROM {}", rel.quoted_name()));
    }

    #[test]
    fn or_predicate_passes_through_whole() {
        let (sql, rel) = statement(
            "SELECT * FROM weather WHERE time > '2025-01-01' OR temp > 3",
            RewriteStrategy::default(),
        );
        assert_eq!(
            sql,
            format!(
                "SELECT * FROM {} WHERE time > '2025-01-01' OR temp > 3",
                rel.quoted_name()
            )
        );
    }

    #[test]
    fn substitution_splices_relation_into_original_text() {
        let (sql, rel) = statement(
            "select *  from \"Weather\" as \"W\" where \"W\".time = 2025-04-10 ;",
            RewriteStrategy::TextualSubstitution,
        );
        assert_eq!(
            sql,
            format!(
                "select *  from {} as \"W\" where \"W\".time = '2025-04-10'",
                rel.quoted_name()
            )
        );
    }

    #[test]
    fn relation_names_are_unique_and_files_distinct() {
        let dup = vec![
            PathBuf::from("/a.parquet"),
            PathBuf::from("/b.parquet"),
            PathBuf::from("/a.parquet"),
        ];
        let r1 = VirtualRelation::new("cpu load", &dup);
        let r2 = VirtualRelation::new("cpu load", &dup);
        assert_ne!(r1.name, r2.name);
        assert!(r1.name.starts_with("cpu_load__q"));
        assert_eq!(
            r1.files,
            vec![PathBuf::from("/a.parquet"), PathBuf::from("/b.parquet")]
        );
    }

    #[test]
    fn identifiers() {
        assert_eq!(sanitize_identifier("Foo-Bar"), "foo_bar");
        assert_eq!(sanitize_identifier("9lives"), "t_9lives");
        assert_eq!(sanitize_identifier(""), "t");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
