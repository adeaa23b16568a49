//! A small SQL tokenizer that keeps byte spans into the original text.
//!
//! Only what clause location and time-predicate matching need is recognized;
//! every other character becomes an [`TokenKind::Other`] token so that no input
//! is silently dropped. Spans always fall on UTF-8 boundaries.

use std::ops::Range;

use crate::sql::error::{
    ExtractResult, UnterminatedCommentSnafu, UnterminatedIdentifierSnafu,
    UnterminatedLiteralSnafu,
};

/// Token classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted identifier or keyword.
    Word,
    /// `"double quoted"` identifier; `value` holds the unescaped name.
    QuotedIdent,
    /// `'single quoted'` literal; `value` holds the unescaped text.
    StringLit,
    /// Numeric literal.
    Number,
    /// Unquoted ISO-8601 date or date-time, e.g. `2025-04-10T14:00:00Z`.
    DateTime,
    /// Comparison or arithmetic operator.
    Operator,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `*`
    Star,
    /// `;`
    Semicolon,
    /// Anything else.
    Other,
}

/// A token with its decoded value and its byte span in the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    /// Token class.
    pub kind: TokenKind,
    /// Decoded value (unescaped for quoted forms, raw text otherwise).
    pub value: String,
    /// Byte span in the source text, quotes included.
    pub span: Range<usize>,
}

impl Token {
    /// Case-insensitive keyword match on an unquoted word.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.value.eq_ignore_ascii_case(keyword)
    }

    /// Exact operator match.
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.value == op
    }

    /// True for tokens that can name a database, table or column.
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_word_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

fn digits_at(bytes: &[u8], at: usize, n: usize) -> bool {
    bytes
        .get(at..at + n)
        .is_some_and(|s| s.iter().all(u8::is_ascii_digit))
}

fn byte_is(bytes: &[u8], at: usize, want: u8) -> bool {
    bytes.get(at) == Some(&want)
}

/// Match `YYYY-MM-DD[THH:MM[:SS[.f+]][Z|±HH[:]MM|±HH]]` starting at `at`.
fn match_datetime(bytes: &[u8], at: usize) -> Option<usize> {
    let date = digits_at(bytes, at, 4)
        && byte_is(bytes, at + 4, b'-')
        && digits_at(bytes, at + 5, 2)
        && byte_is(bytes, at + 7, b'-')
        && digits_at(bytes, at + 8, 2);
    if !date {
        return None;
    }

    let mut j = at + 10;
    if byte_is(bytes, j, b'T')
        && digits_at(bytes, j + 1, 2)
        && byte_is(bytes, j + 3, b':')
        && digits_at(bytes, j + 4, 2)
    {
        j += 6;
        if byte_is(bytes, j, b':') && digits_at(bytes, j + 1, 2) {
            j += 3;
            if byte_is(bytes, j, b'.') && digits_at(bytes, j + 1, 1) {
                j += 1;
                while digits_at(bytes, j, 1) {
                    j += 1;
                }
            }
        }

        if byte_is(bytes, j, b'Z') {
            j += 1;
        } else if (byte_is(bytes, j, b'+') || byte_is(bytes, j, b'-')) && digits_at(bytes, j + 1, 2)
        {
            if byte_is(bytes, j + 3, b':') && digits_at(bytes, j + 4, 2) {
                j += 6;
            } else if digits_at(bytes, j + 3, 2) {
                j += 5;
            } else {
                j += 3;
            }
        }
    }

    match bytes.get(j) {
        Some(&b) if is_word_continue(b) => None,
        _ => Some(j),
    }
}

fn scan_number(bytes: &[u8], at: usize) -> usize {
    let mut j = at;
    while digits_at(bytes, j, 1) {
        j += 1;
    }
    if byte_is(bytes, j, b'.') && digits_at(bytes, j + 1, 1) {
        j += 1;
        while digits_at(bytes, j, 1) {
            j += 1;
        }
    }
    if matches!(bytes.get(j), Some(b'e' | b'E')) {
        let mut k = j + 1;
        if matches!(bytes.get(k), Some(b'+' | b'-')) {
            k += 1;
        }
        if digits_at(bytes, k, 1) {
            j = k;
            while digits_at(bytes, j, 1) {
                j += 1;
            }
        }
    }
    j
}

/// Scan a quoted run starting at the opening quote. Doubled quotes escape.
/// Returns the end offset (past the closing quote) and the unescaped value.
fn scan_quoted(src: &str, at: usize, quote: u8) -> Option<(usize, String)> {
    let bytes = src.as_bytes();
    let mut value = String::new();
    let mut seg_start = at + 1;
    let mut j = at + 1;

    while j < bytes.len() {
        if bytes[j] == quote {
            value.push_str(&src[seg_start..j]);
            if byte_is(bytes, j + 1, quote) {
                value.push(quote as char);
                j += 2;
                seg_start = j;
                continue;
            }
            return Some((j + 1, value));
        }
        j += 1;
    }
    None
}

fn char_len(src: &str, at: usize) -> usize {
    src[at..].chars().next().map_or(1, char::len_utf8)
}

/// Split `sql` into tokens, skipping whitespace and comments.
pub fn tokenize(sql: &str) -> ExtractResult<Vec<Token>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'-' && byte_is(bytes, i + 1, b'-') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        if b == b'/' && byte_is(bytes, i + 1, b'*') {
            let close = sql[i + 2..]
                .find("*/")
                .ok_or_else(|| UnterminatedCommentSnafu { position: i }.build())?;
            i = i + 2 + close + 2;
            continue;
        }

        let start = i;
        let (kind, end, value) = match b {
            b'\'' => {
                let (end, value) = scan_quoted(sql, i, b'\'')
                    .ok_or_else(|| UnterminatedLiteralSnafu { position: i }.build())?;
                (TokenKind::StringLit, end, value)
            }
            b'"' => {
                let (end, value) = scan_quoted(sql, i, b'"')
                    .ok_or_else(|| UnterminatedIdentifierSnafu { position: i }.build())?;
                (TokenKind::QuotedIdent, end, value)
            }
            b'0'..=b'9' => match match_datetime(bytes, i) {
                Some(end) => (TokenKind::DateTime, end, sql[i..end].to_string()),
                None => {
                    let end = scan_number(bytes, i);
                    (TokenKind::Number, end, sql[i..end].to_string())
                }
            },
            b'>' | b'<' | b'=' | b'!' => {
                let two = bytes.get(i..i + 2);
                let len = match two {
                    Some(b">=" | b"<=" | b"<>" | b"!=" | b"==") => 2,
                    _ => 1,
                };
                let kind = if b == b'!' && len == 1 {
                    TokenKind::Other
                } else {
                    TokenKind::Operator
                };
                (kind, i + len, sql[i..i + len].to_string())
            }
            b'|' if byte_is(bytes, i + 1, b'|') => {
                (TokenKind::Operator, i + 2, "||".to_string())
            }
            b':' if byte_is(bytes, i + 1, b':') => {
                (TokenKind::Operator, i + 2, "::".to_string())
            }
            b'+' | b'-' | b'/' | b'%' => (TokenKind::Operator, i + 1, sql[i..i + 1].to_string()),
            b'(' => (TokenKind::LParen, i + 1, "(".to_string()),
            b')' => (TokenKind::RParen, i + 1, ")".to_string()),
            b',' => (TokenKind::Comma, i + 1, ",".to_string()),
            b'.' if digits_at(bytes, i + 1, 1) => {
                let end = scan_number(bytes, i + 1);
                (TokenKind::Number, end, sql[i..end].to_string())
            }
            b'.' => (TokenKind::Dot, i + 1, ".".to_string()),
            b'*' => (TokenKind::Star, i + 1, "*".to_string()),
            b';' => (TokenKind::Semicolon, i + 1, ";".to_string()),
            _ if is_word_start(b) => {
                let mut j = i + 1;
                while j < bytes.len() && is_word_continue(bytes[j]) {
                    j += 1;
                }
                (TokenKind::Word, j, sql[i..j].to_string())
            }
            _ => {
                let end = i + char_len(sql, i);
                (TokenKind::Other, end, sql[i..end].to_string())
            }
        };

        out.push(Token {
            kind,
            value,
            span: start..end,
        });
        i = end;
    }

    Ok(out)
}

/// Wrap every unquoted ISO-8601 date or date-time in single quotes.
///
/// Text that fails to tokenize is returned unchanged; the engine reports the
/// real problem when it parses the statement.
pub fn requote_datetime_literals(text: &str) -> String {
    let Ok(tokens) = tokenize(text) else {
        return text.to_string();
    };

    let mut out = String::with_capacity(text.len() + 8);
    let mut last = 0;
    for tok in tokens.iter().filter(|t| t.kind == TokenKind::DateTime) {
        out.push_str(&text[last..tok.span.start]);
        out.push('\'');
        out.push_str(&text[tok.span.clone()]);
        out.push('\'');
        last = tok.span.end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ExtractError;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_simple_select() {
        use TokenKind::*;
        assert_eq!(
            kinds("SELECT * FROM db.weather WHERE time >= '2025-04-10'"),
            vec![Word, Star, Word, Word, Dot, Word, Word, Word, Operator, StringLit]
        );
    }

    #[test]
    fn spans_point_into_source() {
        let sql = "SELECT temp FROM \"my table\"";
        let toks = tokenize(sql).unwrap();
        let ident = &toks[3];
        assert_eq!(ident.kind, TokenKind::QuotedIdent);
        assert_eq!(ident.value, "my table");
        assert_eq!(&sql[ident.span.clone()], "\"my table\"");
    }

    #[test]
    fn doubled_quotes_escape() {
        let toks = tokenize("'it''s' \"a\"\"b\"").unwrap();
        assert_eq!(toks[0].value, "it's");
        assert_eq!(toks[1].value, "a\"b");
    }

    #[test]
    fn recognizes_bare_datetimes() {
        let toks = tokenize("time > 2025-04-10T14:00:00Z AND d = 2025-04-10").unwrap();
        assert_eq!(toks[2].kind, TokenKind::DateTime);
        assert_eq!(toks[2].value, "2025-04-10T14:00:00Z");
        assert_eq!(toks[6].kind, TokenKind::DateTime);

        let toks = tokenize("2025-04-10T14:00:00.123+02:00").unwrap();
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, TokenKind::DateTime);
    }

    #[test]
    fn plain_arithmetic_is_not_a_datetime() {
        use TokenKind::*;
        assert_eq!(kinds("10-5"), vec![Number, Operator, Number]);
        assert_eq!(kinds("1.5e3"), vec![Number]);
    }

    #[test]
    fn comments_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("SELECT -- note\n a /* b */ FROM t"), vec![Word, Word, Word, Word]);
    }

    #[test]
    fn unterminated_forms_are_errors() {
        assert_eq!(
            tokenize("SELECT 'abc").unwrap_err(),
            ExtractError::UnterminatedLiteral { position: 7 }
        );
        assert!(matches!(
            tokenize("SELECT \"abc").unwrap_err(),
            ExtractError::UnterminatedIdentifier { .. }
        ));
        assert!(matches!(
            tokenize("SELECT /* abc").unwrap_err(),
            ExtractError::UnterminatedComment { .. }
        ));
    }

    #[test]
    fn non_ascii_text_is_preserved() {
        let toks = tokenize("SELECT température FROM m WHERE x = 'é'").unwrap();
        assert_eq!(toks[1].value, "température");
        assert_eq!(toks[7].value, "é");
    }

    #[test]
    fn requote_wraps_only_bare_datetimes() {
        assert_eq!(
            requote_datetime_literals("time >= 2025-04-10T14:00:00 AND x = '2025-01-01'"),
            "time >= '2025-04-10T14:00:00' AND x = '2025-01-01'"
        );
        assert_eq!(requote_datetime_literals("a = 1"), "a = 1");
        assert_eq!(requote_datetime_literals("a = 'open"), "a = 'open");
    }
}
