//! Convert text into tokens
use fallible_iterator::FallibleIterator;

mod chars;
mod number;
mod token;

pub use self::chars::{Chars, Location};
pub use self::number::Num;
pub use self::token::{next_token, Token, TokenErrorClass, TokenType, TokenizerError};

/// A stream of tokens
pub struct Tokens {
    source: Chars,
}

impl FallibleIterator for Tokens {
    type Item = Token;
    type Error = TokenizerError;

    fn next(&mut self) -> Result<Option<Token>, TokenizerError> {
        next_token(&mut self.source)
    }
}

impl Tokens {
    pub fn new(source: &str) -> Tokens {
        Tokens {
            source: Chars::from_str(source),
        }
    }
}
