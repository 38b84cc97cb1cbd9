//! Convert tokens into "datums"
use fallible_iterator::{FallibleIterator, Peekable};

mod datum;

use self::datum::parse_datum;
pub use self::datum::{Datum, DatumKind, ReaderError};
use crate::helpers::ImmutableString;
use crate::lexer::Tokens;

/// A stream of top-level data read from one piece of source text
pub struct Datums {
    tokens: Peekable<Tokens>,
    expr: ImmutableString,
    source: Option<ImmutableString>,
}

impl Datums {
    pub fn new(text: &str, source: Option<ImmutableString>) -> Datums {
        Datums {
            tokens: Tokens::new(text).peekable(),
            expr: text.into(),
            source,
        }
    }
}

impl FallibleIterator for Datums {
    type Item = Datum;
    type Error = ReaderError;

    fn next(&mut self) -> Result<Option<Datum>, ReaderError> {
        let context = datum::Context {
            expr: &self.expr,
            source: &self.source,
        };
        parse_datum(&mut self.tokens, &context)
    }
}

/// Reads every datum in `text`
pub fn read(text: &str, source: Option<ImmutableString>) -> Result<Vec<Datum>, ReaderError> {
    Datums::new(text, source).collect()
}
