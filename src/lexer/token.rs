use std::error::Error;
use std::fmt;

use super::chars::{Chars, Location};
use super::number::{looks_numeric, parse_number, Num};

#[cfg(test)]
#[path = "token_test.rs"]
mod token_test;

/**
    Tokenizer

    Tokens which require implicit termination (identifiers, numbers,
    characters, and dot) must be terminated by a delimiter. Identifiers are
    case-sensitive; `#` markers (booleans, radix prefixes, character names)
    are not.
*/

/// A token together with the place it starts at
#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub ty: TokenType,
    pub location: Location,
}

impl Token {
    pub fn fake(ty: TokenType) -> Token {
        Token {
            ty,
            location: Location::default(),
        }
    }
}

/// The type of a token
#[derive(Clone, PartialEq, Debug)]
pub enum TokenType {
    Identifier(String),
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Character(char),
    String(String),
    OpenVector,
    OpenByteVector,
    Comma,
    CommaAt,
    /// `#;`, the following datum is ignored
    DatumComment,

    Open,
    Close,
    BackQuote,
    SingleQuote,
    Dot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerError {
    pub error: TokenErrorClass,
    pub location: Location,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let message = match self.error {
            TokenErrorClass::InvalidPound => "Invalid # syntax.",
            TokenErrorClass::InvalidCharName => "Invalid character name.",
            TokenErrorClass::UnclosedString => "Unterminated string.",
            TokenErrorClass::UnclosedComment => "Unterminated block comment.",
            TokenErrorClass::InvalidDot => "Invalid use of '.'.",
            TokenErrorClass::UnfinishedChar => "Unfinished character literal.",
            TokenErrorClass::UnexpectedCharacter => "Unexpected character.",
            TokenErrorClass::InvalidScaping => "Invalid escape sequence.",
            TokenErrorClass::BadMarker => "Invalid number prefix.",
            TokenErrorClass::BadExactness => "Number cannot be made exact.",
            TokenErrorClass::BadDigit => "Invalid digit in number.",
            TokenErrorClass::BadDecimal => "Invalid decimal number.",
            TokenErrorClass::BadSuffix => "Invalid exponent.",
            TokenErrorClass::EmptyNumber => "Missing digits in number.",
            TokenErrorClass::Overflow => "Number out of range.",
        };
        fmt.write_str(message)
    }
}

impl Error for TokenizerError {}

/// The possible errors while tokenizing the input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenErrorClass {
    InvalidPound,
    InvalidCharName,
    UnclosedString,
    UnclosedComment,
    InvalidDot,
    UnfinishedChar,
    UnexpectedCharacter,
    InvalidScaping,
    BadMarker,
    BadExactness,
    BadDigit,
    BadDecimal,
    BadSuffix,
    EmptyNumber,
    Overflow,
}

macro_rules! tok_ret {
    ($value:expr, at $location:expr) => {{
        return Ok(Some(Token {
            ty: $value,
            location: $location,
        }));
    }};
}

macro_rules! ret_err {
    ($err:ident, at $location:expr) => {{
        return Err(TokenizerError {
            error: TokenErrorClass::$err,
            location: $location,
        });
    }};
}

#[inline]
fn is_delimiter(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || c == '(' || c == ')' || c == '"' || c == ';',
    }
}

// Characters that may not appear in an identifier
#[inline]
fn is_reserved(c: char) -> bool {
    match c {
        '\'' | '`' | ',' | '#' | '|' | '[' | ']' | '{' | '}' => true,
        _ => false,
    }
}

fn char_by_name(name: &str) -> Option<char> {
    let c = match &name.to_ascii_lowercase()[..] {
        "space" => ' ',
        "newline" | "linefeed" => '\n',
        "tab" => '\t',
        "return" => '\r',
        "nul" | "null" => '\0',
        "alarm" => '\u{7}',
        "backspace" => '\u{8}',
        "delete" => '\u{7f}',
        "escape" => '\u{1b}',
        _ => return None,
    };
    Some(c)
}

fn hex_char(digits: &str) -> Option<char> {
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(std::char::from_u32)
}

// Reads characters up to the next delimiter
fn read_atom(stream: &mut Chars) -> String {
    let mut atom = String::new();
    while !is_delimiter(stream.peek(0)) {
        if let Some(c) = stream.next() {
            atom.push(c);
        }
    }
    atom
}

fn skip_block_comment(stream: &mut Chars, start: Location) -> Result<(), TokenizerError> {
    let mut depth = 1;
    stream.advance(2);
    while depth > 0 {
        match (stream.next(), stream.peek(0)) {
            (None, _) => ret_err!(UnclosedComment, at start),
            (Some('|'), Some('#')) => {
                stream.advance(1);
                depth -= 1;
            }
            (Some('#'), Some('|')) => {
                stream.advance(1);
                depth += 1;
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_string(stream: &mut Chars, start: Location) -> Result<String, TokenizerError> {
    let mut string_buf = String::new();
    loop {
        let escape_location = stream.location();
        match stream.next() {
            None => ret_err!(UnclosedString, at start),
            Some('"') => return Ok(string_buf),
            Some('\\') => match stream.next() {
                Some('"') => string_buf.push('"'),
                Some('\\') => string_buf.push('\\'),
                Some('n') => string_buf.push('\n'),
                Some('t') => string_buf.push('\t'),
                Some('r') => string_buf.push('\r'),
                Some('a') => string_buf.push('\u{7}'),
                Some('0') => string_buf.push('\0'),
                Some('x') | Some('X') => {
                    let mut digits = String::new();
                    while let Some(c) = stream.peek(0) {
                        if !c.is_ascii_hexdigit() {
                            break;
                        }
                        digits.push(c);
                        stream.advance(1);
                    }
                    if stream.peek(0) == Some(';') {
                        stream.advance(1);
                    }
                    match hex_char(&digits) {
                        Some(c) => string_buf.push(c),
                        None => ret_err!(InvalidScaping, at escape_location),
                    }
                }
                Some('\n') => {
                    while let Some(c) = stream.peek(0) {
                        if c != ' ' && c != '\t' {
                            break;
                        }
                        stream.advance(1);
                    }
                }
                _ => ret_err!(InvalidScaping, at escape_location),
            },
            Some(c) => string_buf.push(c),
        }
    }
}

fn read_character(stream: &mut Chars, start: Location) -> Result<char, TokenizerError> {
    // The first character is taken verbatim, even a delimiter
    let first = match stream.next() {
        Some(c) => c,
        None => ret_err!(UnfinishedChar, at start),
    };
    let mut name = first.to_string();
    name.push_str(&read_atom(stream));

    if name.chars().count() == 1 {
        return Ok(first);
    }
    if let Some(c) = char_by_name(&name) {
        return Ok(c);
    }
    if first == 'x' || first == 'X' {
        if let Some(c) = hex_char(&name[1..]) {
            return Ok(c);
        }
    }
    ret_err!(InvalidCharName, at start)
}

pub fn next_token(stream: &mut Chars) -> Result<Option<Token>, TokenizerError> {
    loop {
        let start = stream.location();
        let c = match stream.peek(0) {
            Some(c) => c,
            None => return Ok(None),
        };

        if c.is_whitespace() {
            stream.advance(1);
            continue;
        }

        match c {
            ';' => {
                while let Some(d) = stream.next() {
                    if d == '\n' {
                        break;
                    }
                }
                continue;
            }
            '(' | '[' => {
                stream.advance(1);
                tok_ret!(TokenType::Open, at start)
            }
            ')' | ']' => {
                stream.advance(1);
                tok_ret!(TokenType::Close, at start)
            }
            '`' => {
                stream.advance(1);
                tok_ret!(TokenType::BackQuote, at start)
            }
            '\'' => {
                stream.advance(1);
                tok_ret!(TokenType::SingleQuote, at start)
            }
            ',' => {
                stream.advance(1);
                if stream.peek(0) == Some('@') {
                    stream.advance(1);
                    tok_ret!(TokenType::CommaAt, at start)
                }
                tok_ret!(TokenType::Comma, at start)
            }
            '"' => {
                stream.advance(1);
                let string = read_string(stream, start)?;
                tok_ret!(TokenType::String(string), at start)
            }
            '#' => match stream.peek(1) {
                Some('|') => {
                    skip_block_comment(stream, start)?;
                    continue;
                }
                Some(';') => {
                    stream.advance(2);
                    tok_ret!(TokenType::DatumComment, at start)
                }
                Some('(') => {
                    stream.advance(2);
                    tok_ret!(TokenType::OpenVector, at start)
                }
                Some('\\') => {
                    stream.advance(2);
                    let character = read_character(stream, start)?;
                    tok_ret!(TokenType::Character(character), at start)
                }
                Some('u') | Some('U')
                    if stream.peek(2) == Some('8') && stream.peek(3) == Some('(') =>
                {
                    stream.advance(4);
                    tok_ret!(TokenType::OpenByteVector, at start)
                }
                _ => {
                    let atom = read_atom(stream);
                    match &atom.to_ascii_lowercase()[..] {
                        "#t" | "#true" => tok_ret!(TokenType::Boolean(true), at start),
                        "#f" | "#false" => tok_ret!(TokenType::Boolean(false), at start),
                        _ if looks_numeric(&atom) => return number_token(&atom, start),
                        _ => ret_err!(InvalidPound, at start),
                    }
                }
            },
            _ => {
                let atom = read_atom(stream);
                if atom == "." {
                    tok_ret!(TokenType::Dot, at start)
                }
                if looks_numeric(&atom) {
                    return number_token(&atom, start);
                }
                if atom.starts_with('.') && atom != "..." {
                    ret_err!(InvalidDot, at start)
                }
                if atom.chars().any(is_reserved) {
                    ret_err!(UnexpectedCharacter, at start)
                }
                tok_ret!(TokenType::Identifier(atom), at start)
            }
        }
    }
}

fn number_token(atom: &str, start: Location) -> Result<Option<Token>, TokenizerError> {
    match parse_number(atom) {
        Ok(Num::Integer(n)) => tok_ret!(TokenType::Integer(n), at start),
        Ok(Num::Float(f)) => tok_ret!(TokenType::Float(f), at start),
        Err(error) => Err(TokenizerError {
            error,
            location: start,
        }),
    }
}
