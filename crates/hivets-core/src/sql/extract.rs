//! Statement → [`QueryDescriptor`] extraction.
//!
//! The grammar covers exactly:
//!
//! ```text
//! SELECT <columns> FROM [db.]measurement [[AS] alias]
//!   [WHERE <conjuncts>] [GROUP BY ..] [HAVING ..] [ORDER BY ..] [LIMIT n [OFFSET m]]
//! ```
//!
//! Clause keywords are only recognized at parenthesis depth 0, so subqueries
//! and function bodies (`EXTRACT(HOUR FROM time)`, `OVER (ORDER BY ..)`) pass
//! through untouched. Anything outside this shape is rejected with an
//! [`ExtractError`] instead of being rewritten.
//!
//! Time conjuncts recognized against a column literally named `time`:
//! `time > lit`, `time >= lit`, `time < lit`, `time <= lit`, `time = lit`,
//! the mirrored `lit OP time`, and `time BETWEEN lit AND lit`.

use std::ops::Range;

use log::debug;

use crate::{
    interval::now_nanos,
    layout::is_valid_component,
    sql::{
        descriptor::{QueryDescriptor, TimeRange},
        error::{
            ClauseOrderSnafu, EmptyClauseSnafu, ExtractResult, InvalidDatabaseSnafu,
            InvalidLimitSnafu, MissingFromSnafu, MultipleStatementsSnafu, NotASelectSnafu,
            UnbalancedParensSnafu, UnsupportedClauseSnafu, UnsupportedFromSnafu,
        },
        time_literal::parse_time_literal,
        tokenizer::{Token, TokenKind, tokenize},
    },
};

const TIME_COLUMN: &str = "time";

const JOIN_WORDS: &[&str] = &[
    "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "LATERAL", "ON", "USING",
];

const UNSUPPORTED_TOP_LEVEL: &[&str] = &[
    "UNION", "INTERSECT", "EXCEPT", "WITH", "WINDOW", "QUALIFY", "INTO",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Clause {
    Select,
    From,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
}

impl Clause {
    fn keyword(self) -> &'static str {
        match self {
            Clause::Select => "SELECT",
            Clause::From => "FROM",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
        }
    }
}

#[derive(Debug)]
struct ClauseSpan {
    clause: Clause,
    /// Token index of the clause keyword.
    keyword: usize,
    /// Token range of the clause body.
    body: Range<usize>,
}

#[derive(Debug)]
struct TableRef {
    database: Option<String>,
    measurement: String,
    alias: Option<String>,
    span: Range<usize>,
}

/// One recognized time conjunct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimeComparison {
    Lower(i64),
    Upper(i64),
    Exact(i64),
    Between(i64, i64),
}

/// Extract a descriptor, defaulting a missing upper bound to the current instant.
pub fn extract(sql: &str, fallback_db: &str) -> ExtractResult<QueryDescriptor> {
    extract_at(sql, fallback_db, now_nanos())
}

/// Extract a descriptor with an explicit "now" (epoch nanoseconds).
pub fn extract_at(sql: &str, fallback_db: &str, now_ns: i64) -> ExtractResult<QueryDescriptor> {
    let mut tokens = tokenize(sql)?;
    while tokens.last().is_some_and(|t| t.kind == TokenKind::Semicolon) {
        tokens.pop();
    }
    if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
        return MultipleStatementsSnafu.fail();
    }

    let clauses = locate_clauses(&tokens)?;

    let select = clauses
        .first()
        .filter(|c| c.clause == Clause::Select && c.keyword == 0)
        .ok_or_else(|| NotASelectSnafu.build())?;
    let from = clauses
        .iter()
        .find(|c| c.clause == Clause::From)
        .ok_or_else(|| MissingFromSnafu.build())?;

    let columns = match body_text(sql, &tokens, &select.body) {
        "" => "*".to_string(),
        text => text.to_string(),
    };

    let table = parse_table_ref(sql, &tokens[from.body.clone()])?;
    if table.database.is_none() && !is_valid_component(fallback_db) {
        return InvalidDatabaseSnafu { name: fallback_db }.fail();
    }

    let mut descriptor = QueryDescriptor {
        source: sql.to_string(),
        columns,
        database: table.database.unwrap_or_else(|| fallback_db.to_string()),
        measurement: table.measurement,
        table_alias: table.alias,
        table_span: table.span,
        time_range: TimeRange::unbounded(),
        where_conditions: None,
        group_by: None,
        having: None,
        order_by: None,
        limit: None,
        offset: None,
    };

    for span in &clauses {
        let text = body_text(sql, &tokens, &span.body);
        match span.clause {
            Clause::Select | Clause::From => {}
            Clause::Where => {
                let (range, residue) = analyze_where(sql, &tokens[span.body.clone()], now_ns);
                descriptor.time_range = range;
                descriptor.where_conditions = residue;
            }
            Clause::GroupBy => descriptor.group_by = Some(text.to_string()),
            Clause::Having => descriptor.having = Some(text.to_string()),
            Clause::OrderBy => descriptor.order_by = Some(text.to_string()),
            Clause::Limit => {
                let (limit, offset) = parse_limit(&tokens[span.body.clone()], text)?;
                descriptor.limit = Some(limit);
                descriptor.offset = offset;
            }
        }
    }

    debug!(
        "extracted {}.{} range=[{:?}, {:?}] residue={:?}",
        descriptor.database,
        descriptor.measurement,
        descriptor.time_range.start,
        descriptor.time_range.end,
        descriptor.where_conditions
    );

    Ok(descriptor)
}

fn body_text<'a>(sql: &'a str, tokens: &[Token], body: &Range<usize>) -> &'a str {
    if body.is_empty() {
        return "";
    }
    let start = tokens[body.start].span.start;
    let end = tokens[body.end - 1].span.end;
    sql[start..end].trim()
}

fn locate_clauses(tokens: &[Token]) -> ExtractResult<Vec<ClauseSpan>> {
    let mut depth: usize = 0;
    // (clause, keyword token index, body start index)
    let mut found: Vec<(Clause, usize, usize)> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    UnbalancedParensSnafu {
                        position: t.span.start,
                    }
                    .build()
                })?;
            }
            TokenKind::Word if depth == 0 => {
                let next_is_by = tokens.get(i + 1).is_some_and(|n| n.is_keyword("BY"));
                let clause = match t.value.to_ascii_uppercase().as_str() {
                    "SELECT" => Some((Clause::Select, 1)),
                    "FROM" => Some((Clause::From, 1)),
                    "WHERE" => Some((Clause::Where, 1)),
                    "GROUP" if next_is_by => Some((Clause::GroupBy, 2)),
                    "HAVING" => Some((Clause::Having, 1)),
                    "ORDER" if next_is_by => Some((Clause::OrderBy, 2)),
                    "LIMIT" => Some((Clause::Limit, 1)),
                    kw if UNSUPPORTED_TOP_LEVEL.contains(&kw) => {
                        return UnsupportedClauseSnafu { keyword: kw }.fail();
                    }
                    _ => None,
                };

                if let Some((clause, width)) = clause {
                    found.push((clause, i, i + width));
                    i += width;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if depth != 0 {
        let position = tokens.last().map_or(0, |t| t.span.end);
        return UnbalancedParensSnafu { position }.fail();
    }

    for pair in found.windows(2) {
        if pair[1].0 <= pair[0].0 {
            return ClauseOrderSnafu {
                keyword: pair[1].0.keyword(),
            }
            .fail();
        }
    }

    let mut spans = Vec::with_capacity(found.len());
    for (idx, &(clause, keyword, body_start)) in found.iter().enumerate() {
        let body_end = found.get(idx + 1).map_or(tokens.len(), |next| next.1);
        if clause != Clause::Select && body_start >= body_end {
            return EmptyClauseSnafu {
                keyword: clause.keyword(),
            }
            .fail();
        }
        spans.push(ClauseSpan {
            clause,
            keyword,
            body: body_start..body_end,
        });
    }

    Ok(spans)
}

fn is_name_part(t: &Token) -> bool {
    match t.kind {
        TokenKind::QuotedIdent => true,
        TokenKind::Word => !JOIN_WORDS.iter().any(|w| t.is_keyword(w)) && !t.is_keyword("AS"),
        _ => false,
    }
}

fn parse_table_ref(sql: &str, tokens: &[Token]) -> ExtractResult<TableRef> {
    let Some(first) = tokens.first().filter(|t| is_name_part(t)) else {
        let detail = match tokens.first() {
            Some(t) if t.kind == TokenKind::LParen => "subqueries are not supported".to_string(),
            Some(t) => format!("expected a table name, found `{}`", t.value),
            None => "expected a table name".to_string(),
        };
        return UnsupportedFromSnafu { detail }.fail();
    };

    let mut parts = vec![first];
    let mut idx = 1;
    while idx + 1 < tokens.len()
        && tokens[idx].kind == TokenKind::Dot
        && is_name_part(&tokens[idx + 1])
    {
        parts.push(&tokens[idx + 1]);
        idx += 2;
    }

    if parts.len() > 2 {
        return UnsupportedFromSnafu {
            detail: "table references have at most two parts (database.measurement)",
        }
        .fail();
    }

    let span = first.span.start..parts[parts.len() - 1].span.end;

    let mut alias = None;
    if let Some(t) = tokens.get(idx) {
        if t.is_keyword("AS") {
            match tokens.get(idx + 1).filter(|a| is_name_part(a)) {
                Some(a) => {
                    alias = Some(sql[a.span.clone()].to_string());
                    idx += 2;
                }
                None => {
                    return UnsupportedFromSnafu {
                        detail: "AS must be followed by an alias",
                    }
                    .fail();
                }
            }
        } else if is_name_part(t) {
            alias = Some(sql[t.span.clone()].to_string());
            idx += 1;
        }
    }

    if let Some(extra) = tokens.get(idx) {
        let detail = if extra.kind == TokenKind::Comma
            || JOIN_WORDS.iter().any(|w| extra.is_keyword(w))
        {
            "joins and table lists are not supported".to_string()
        } else {
            format!("unexpected `{}` after the table reference", extra.value)
        };
        return UnsupportedFromSnafu { detail }.fail();
    }

    if let Some(bad) = parts.iter().find(|p| !is_valid_component(&p.value)) {
        return UnsupportedFromSnafu {
            detail: format!("`{}` is not a valid table or database name", bad.value),
        }
        .fail();
    }

    let (database, measurement) = match parts.as_slice() {
        [db, m] => (Some(db.value.clone()), m.value.clone()),
        _ => (None, first.value.clone()),
    };

    Ok(TableRef {
        database,
        measurement,
        alias,
        span,
    })
}

fn parse_limit(tokens: &[Token], text: &str) -> ExtractResult<(u64, Option<u64>)> {
    let int = |t: &Token| {
        (t.kind == TokenKind::Number)
            .then(|| t.value.parse::<u64>().ok())
            .flatten()
    };
    let invalid = || InvalidLimitSnafu { text }.build();

    match tokens {
        [n] => Ok((int(n).ok_or_else(invalid)?, None)),
        [n, kw, m] if kw.is_keyword("OFFSET") => Ok((
            int(n).ok_or_else(invalid)?,
            Some(int(m).ok_or_else(invalid)?),
        )),
        _ => Err(invalid()),
    }
}

/// Split a `WHERE` body into time bounds and the remaining conjuncts.
fn analyze_where(sql: &str, tokens: &[Token], now_ns: i64) -> (TimeRange, Option<String>) {
    let whole = body_text(sql, tokens, &(0..tokens.len())).to_string();

    let mut conjuncts: Vec<Range<usize>> = Vec::new();
    let mut depth: usize = 0;
    let mut between_pending = false;
    let mut start = 0;

    for (i, t) in tokens.iter().enumerate() {
        match t.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Word if depth == 0 => {
                if t.is_keyword("OR") {
                    // A top-level OR means no single conjunct bounds every row.
                    debug!("top-level OR in WHERE; time pruning disabled");
                    return (TimeRange::unbounded(), Some(whole));
                }
                if t.is_keyword("BETWEEN") {
                    between_pending = true;
                } else if t.is_keyword("AND") {
                    if between_pending {
                        between_pending = false;
                    } else {
                        conjuncts.push(start..i);
                        start = i + 1;
                    }
                }
            }
            _ => {}
        }
    }
    conjuncts.push(start..tokens.len());

    let mut time_texts = Vec::new();
    let mut residue_texts = Vec::new();
    let mut comparisons = Vec::new();

    for range in conjuncts.into_iter().filter(|r| !r.is_empty()) {
        let text = body_text(sql, tokens, &range).to_string();
        match classify_conjunct(&tokens[range]) {
            Some(cmp) => {
                comparisons.push(cmp);
                time_texts.push(text);
            }
            None => residue_texts.push(text),
        }
    }

    let residue = (!residue_texts.is_empty()).then(|| residue_texts.join(" AND "));
    if comparisons.is_empty() {
        return (TimeRange::unbounded(), residue);
    }

    let (start, end) = combine_comparisons(&comparisons);
    let range = TimeRange {
        start: Some(start.unwrap_or(0)),
        end: Some(end.unwrap_or(now_ns)),
        condition_text: Some(time_texts.join(" AND ")),
    };
    (range, residue)
}

/// `BETWEEN` wins outright. Otherwise bounds intersect: the greatest lower
/// bound and the least upper bound, with `=` contributing to both.
fn combine_comparisons(comparisons: &[TimeComparison]) -> (Option<i64>, Option<i64>) {
    if let Some((lo, hi)) = comparisons.iter().find_map(|c| match c {
        TimeComparison::Between(lo, hi) => Some((*lo, *hi)),
        _ => None,
    }) {
        return (Some(lo), Some(hi));
    }

    let mut start: Option<i64> = None;
    let mut end: Option<i64> = None;
    for c in comparisons {
        match *c {
            TimeComparison::Lower(ns) => start = Some(start.map_or(ns, |s| s.max(ns))),
            TimeComparison::Upper(ns) => end = Some(end.map_or(ns, |e| e.min(ns))),
            TimeComparison::Exact(ns) => {
                start = Some(start.map_or(ns, |s| s.max(ns)));
                end = Some(end.map_or(ns, |e| e.min(ns)));
            }
            TimeComparison::Between(..) => {}
        }
    }
    (start, end)
}

fn strip_outer_parens(mut tokens: &[Token]) -> &[Token] {
    while tokens.len() >= 2
        && tokens[0].kind == TokenKind::LParen
        && tokens[tokens.len() - 1].kind == TokenKind::RParen
    {
        // Only strip when the first paren closes at the very end.
        let mut depth = 0usize;
        let mut closes_at_end = true;
        for (i, t) in tokens.iter().enumerate() {
            match t.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 && i != tokens.len() - 1 {
                        closes_at_end = false;
                        break;
                    }
                }
                _ => {}
            }
        }
        if !closes_at_end {
            break;
        }
        tokens = &tokens[1..tokens.len() - 1];
    }
    tokens
}

fn is_time_ident(t: &Token) -> bool {
    match t.kind {
        TokenKind::Word => t.value.eq_ignore_ascii_case(TIME_COLUMN),
        TokenKind::QuotedIdent => t.value == TIME_COLUMN,
        _ => false,
    }
}

/// Number of leading tokens forming a (possibly qualified) `time` reference.
fn time_column_len(tokens: &[Token]) -> Option<usize> {
    match tokens {
        [t, ..] if is_time_ident(t) => Some(1),
        [q, dot, t, ..] if q.is_identifier() && dot.kind == TokenKind::Dot && is_time_ident(t) => {
            Some(3)
        }
        _ => None,
    }
}

fn time_literal(t: &Token) -> Option<i64> {
    match t.kind {
        TokenKind::StringLit | TokenKind::DateTime => parse_time_literal(&t.value),
        _ => None,
    }
}

fn comparison(op: &str, ns: i64) -> Option<TimeComparison> {
    match op {
        ">" | ">=" => Some(TimeComparison::Lower(ns)),
        "<" | "<=" => Some(TimeComparison::Upper(ns)),
        "=" | "==" => Some(TimeComparison::Exact(ns)),
        _ => None,
    }
}

/// Flip comparison direction when operands are swapped.
fn flip_op(op: &str) -> &str {
    match op {
        ">" => "<",
        ">=" => "<=",
        "<" => ">",
        "<=" => ">=",
        other => other,
    }
}

fn classify_conjunct(tokens: &[Token]) -> Option<TimeComparison> {
    let toks = strip_outer_parens(tokens);

    if let Some(n) = time_column_len(toks) {
        match &toks[n..] {
            [op, lit] if op.kind == TokenKind::Operator => {
                return comparison(&op.value, time_literal(lit)?);
            }
            [between, lo, and, hi] if between.is_keyword("BETWEEN") && and.is_keyword("AND") => {
                return Some(TimeComparison::Between(time_literal(lo)?, time_literal(hi)?));
            }
            _ => return None,
        }
    }

    // lit OP time
    match toks {
        [lit, op, rest @ ..] if op.kind == TokenKind::Operator => {
            if time_column_len(rest) == Some(rest.len()) {
                comparison(flip_op(&op.value), time_literal(lit)?)
            } else {
                None
            }
        }
        _ => None,
    }
}
