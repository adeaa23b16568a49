use snafu::prelude::*;

/// The statement cannot be turned into a query descriptor.
///
/// Every variant is a "malformed query": the statement is rejected before any
/// file resolution happens and is never retried.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum ExtractError {
    /// No top-level `FROM` clause.
    #[snafu(display("Malformed query: no FROM clause naming a table"))]
    MissingFrom,

    /// The statement does not start with `SELECT`.
    #[snafu(display("Malformed query: statement must start with SELECT"))]
    NotASelect,

    /// The `FROM` clause is not a single `[database.]measurement` reference.
    #[snafu(display("Malformed query: unsupported FROM clause: {detail}"))]
    UnsupportedFrom {
        /// What was found instead.
        detail: String,
    },

    /// The database given for an unqualified table reference is not a
    /// single path component.
    #[snafu(display("Malformed query: invalid database name '{name}'"))]
    InvalidDatabase {
        /// The rejected name.
        name: String,
    },

    /// A statement shape outside the supported `SELECT` grammar.
    #[snafu(display("Malformed query: unsupported clause {keyword}"))]
    UnsupportedClause {
        /// The offending keyword.
        keyword: String,
    },

    /// A clause appears twice or out of the canonical order.
    #[snafu(display("Malformed query: clause {keyword} is repeated or out of order"))]
    ClauseOrder {
        /// The offending clause keyword.
        keyword: String,
    },

    /// A clause keyword without a body.
    #[snafu(display("Malformed query: {keyword} clause is empty"))]
    EmptyClause {
        /// The clause keyword.
        keyword: String,
    },

    /// A `'...'` literal without its closing quote.
    #[snafu(display("Malformed query: unterminated string literal at byte {position}"))]
    UnterminatedLiteral {
        /// Byte offset of the opening quote.
        position: usize,
    },

    /// A `"..."` identifier without its closing quote.
    #[snafu(display("Malformed query: unterminated quoted identifier at byte {position}"))]
    UnterminatedIdentifier {
        /// Byte offset of the opening quote.
        position: usize,
    },

    /// A `/* ...` comment without `*/`.
    #[snafu(display("Malformed query: unterminated comment at byte {position}"))]
    UnterminatedComment {
        /// Byte offset of the comment start.
        position: usize,
    },

    /// Parentheses do not balance.
    #[snafu(display("Malformed query: unbalanced parenthesis at byte {position}"))]
    UnbalancedParens {
        /// Byte offset where the imbalance was detected.
        position: usize,
    },

    /// `LIMIT` body is not a non-negative integer (optionally with `OFFSET n`).
    #[snafu(display("Malformed query: invalid LIMIT '{text}'"))]
    InvalidLimit {
        /// The clause body.
        text: String,
    },

    /// More than one statement separated by `;`.
    #[snafu(display("Malformed query: only a single statement is supported"))]
    MultipleStatements,
}

/// Result alias for extraction.
pub type ExtractResult<T> = Result<T, ExtractError>;
