//! SQL front end: tokenizing, time-literal parsing and descriptor extraction.

mod descriptor;
mod error;
mod extract;
mod time_literal;
mod tokenizer;

pub use descriptor::{QueryDescriptor, TimeRange};
pub use error::{ExtractError, ExtractResult};
pub use extract::{extract, extract_at};
pub use time_literal::parse_time_literal;
pub use tokenizer::{Token, TokenKind, requote_datetime_literals, tokenize};
