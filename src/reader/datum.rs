use std::error::Error;
use std::fmt;

use fallible_iterator::{FallibleIterator, Peekable};

use crate::error::Position;
use crate::helpers::{char_literal, string_literal, ImmutableString};
use crate::lexer::{Location, Token, TokenType, Tokens, TokenizerError};

/// A "datum" is a balanced token tree carrying the position it was read at
#[derive(Debug, Clone)]
pub struct Datum {
    pub kind: DatumKind,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatumKind {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Character(char),
    String(String),
    Symbol(String),
    List(Vec<Datum>),
    // car is non-empty and cdr is never a list
    Pair { car: Vec<Datum>, cdr: Box<Datum> },
    Vector(Vec<Datum>),
    ByteVector(Vec<u8>),
}

// Positions are irrelevant to equality
impl PartialEq for Datum {
    fn eq(&self, other: &Datum) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderError {
    UnexpectedEOF(Location),
    UnexpectedListToken(Location),
    UnexpectedToken(Location),
    InvalidByte(Location),
    TooDeep(Location),
    Tokenizer(TokenizerError),
}

impl ReaderError {
    pub fn location(&self) -> Location {
        match *self {
            ReaderError::UnexpectedEOF(l)
            | ReaderError::UnexpectedListToken(l)
            | ReaderError::UnexpectedToken(l)
            | ReaderError::InvalidByte(l)
            | ReaderError::TooDeep(l) => l,
            ReaderError::Tokenizer(ref e) => e.location,
        }
    }
}

impl fmt::Display for ReaderError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ReaderError::UnexpectedEOF(_) => fmt.write_str("Unexpected end of input."),
            ReaderError::UnexpectedListToken(_) => fmt.write_str("Malformed list."),
            ReaderError::UnexpectedToken(_) => fmt.write_str("Unexpected token."),
            ReaderError::InvalidByte(_) => fmt.write_str("Byte vector elements must be integers in 0..255."),
            ReaderError::TooDeep(_) => fmt.write_str("Expression too deeply nested."),
            ReaderError::Tokenizer(ref e) => write!(fmt, "{}", e),
        }
    }
}

impl Error for ReaderError {}

impl From<TokenizerError> for ReaderError {
    fn from(e: TokenizerError) -> ReaderError {
        ReaderError::Tokenizer(e)
    }
}

pub struct Context<'a> {
    pub expr: &'a ImmutableString,
    pub source: &'a Option<ImmutableString>,
}

impl<'a> Context<'a> {
    fn position(&self, location: Location) -> Position {
        Position::new(
            self.expr.clone(),
            self.source.clone(),
            location.index,
            location.line,
            location.line_start,
        )
    }
}

type Stream = Peekable<Tokens>;

// Nesting of lists, vectors and abbreviations before giving up
const MAX_DEPTH: usize = 512;

fn peek_type(stream: &mut Stream) -> Result<Option<TokenType>, ReaderError> {
    Ok(stream.peek()?.map(|t| t.ty.clone()))
}

// `#;` drops the datum that follows it
fn skip_datum_comments(stream: &mut Stream, ctx: &Context, depth: usize) -> Result<(), ReaderError> {
    while let Some(TokenType::DatumComment) = peek_type(stream)? {
        let Token { location, .. } = stream.next()?.ok_or(ReaderError::UnexpectedEOF(Location::default()))?;
        parse_nested(stream, ctx, depth + 1)?.ok_or(ReaderError::UnexpectedEOF(location))?;
    }
    Ok(())
}

pub fn parse_datum(stream: &mut Stream, ctx: &Context) -> Result<Option<Datum>, ReaderError> {
    parse_nested(stream, ctx, 0)
}

fn parse_nested(stream: &mut Stream, ctx: &Context, depth: usize) -> Result<Option<Datum>, ReaderError> {
    if depth >= MAX_DEPTH {
        return match stream.peek()? {
            Some(t) => Err(ReaderError::TooDeep(t.location)),
            None => Ok(None),
        };
    }
    skip_datum_comments(stream, ctx, depth)?;

    let Token { ty, location } = match stream.next()? {
        Some(t) => t,
        None => return Ok(None),
    };
    let inner = depth + 1;
    let position = ctx.position(location);

    let kind = match ty {
        TokenType::Boolean(b) => DatumKind::Boolean(b),
        TokenType::Integer(n) => DatumKind::Integer(n),
        TokenType::Float(f) => DatumKind::Float(f),
        TokenType::Character(c) => DatumKind::Character(c),
        TokenType::String(s) => DatumKind::String(s),
        TokenType::Identifier(x) => DatumKind::Symbol(x),

        TokenType::Open => return parse_list_datum(stream, ctx, location, inner).map(Some),
        TokenType::Comma | TokenType::CommaAt | TokenType::SingleQuote | TokenType::BackQuote => {
            let keyword = match ty {
                TokenType::Comma => "unquote",
                TokenType::CommaAt => "unquote-splicing",
                TokenType::SingleQuote => "quote",
                _ => "quasiquote",
            };

            let datum = parse_nested(stream, ctx, inner)?.ok_or(ReaderError::UnexpectedEOF(location))?;
            DatumKind::List(vec![
                Datum::new(DatumKind::Symbol(keyword.to_string()), position.clone()),
                datum,
            ])
        }
        TokenType::OpenVector => DatumKind::Vector(parse_sequence(stream, ctx, location, inner)?),
        TokenType::OpenByteVector => {
            let mut bytes = vec![];
            for datum in parse_sequence(stream, ctx, location, inner)? {
                match datum.kind {
                    DatumKind::Integer(n) if n >= 0 && n <= 255 => bytes.push(n as u8),
                    _ => return Err(ReaderError::InvalidByte(location)),
                }
            }
            DatumKind::ByteVector(bytes)
        }
        _ => return Err(ReaderError::UnexpectedToken(location)),
    };

    ok_some!(Datum::new(kind, position))
}

// Elements up to the closing parenthesis; the opening token is already consumed
fn parse_sequence(stream: &mut Stream, ctx: &Context, open: Location, depth: usize) -> Result<Vec<Datum>, ReaderError> {
    let mut datums = vec![];

    loop {
        skip_datum_comments(stream, ctx, depth)?;
        if peek_type(stream)?.ok_or(ReaderError::UnexpectedEOF(open))? == TokenType::Close {
            stream.next()?;
            return Ok(datums);
        }

        let datum = parse_nested(stream, ctx, depth)?.ok_or(ReaderError::UnexpectedEOF(open))?;
        datums.push(datum);
    }
}

// Assumes a stream without the initial Open
fn parse_list_datum(stream: &mut Stream, ctx: &Context, open: Location, depth: usize) -> Result<Datum, ReaderError> {
    let mut datums = vec![];
    let mut last = None;
    let mut is_pair = false;

    loop {
        skip_datum_comments(stream, ctx, depth)?;
        let (ty, location) = match stream.peek()? {
            Some(t) => (t.ty.clone(), t.location),
            None => return Err(ReaderError::UnexpectedEOF(open)),
        };

        match ty {
            TokenType::Close if !is_pair => {
                stream.next()?;
                return Ok(Datum::new(DatumKind::List(datums), ctx.position(open)));
            }
            TokenType::Close if last.is_some() => {
                stream.next()?;
                let cdr = last.ok_or(ReaderError::UnexpectedListToken(location))?;
                return Ok(Datum::pair(datums, cdr, ctx.position(open)));
            }
            TokenType::Dot if !is_pair && !datums.is_empty() => {
                is_pair = true;
                stream.next()?;
                continue;
            }
            // Close and Dot are errors in any other circumstances
            // Also any other token after finishing a pair
            TokenType::Close | TokenType::Dot => return Err(ReaderError::UnexpectedListToken(location)),
            _ if last.is_some() => return Err(ReaderError::UnexpectedListToken(location)),
            _ => {}
        }

        let d = parse_nested(stream, ctx, depth)?.ok_or(ReaderError::UnexpectedEOF(open))?;
        if is_pair {
            last = Some(d);
        } else {
            datums.push(d);
        }
    }
}

impl Datum {
    pub fn new(kind: DatumKind, position: Position) -> Datum {
        Datum { kind, position }
    }

    /// Builds `(car ... . cdr)`, flattening a list or pair in the tail
    pub fn pair(mut car: Vec<Datum>, cdr: Datum, position: Position) -> Datum {
        if car.is_empty() {
            return cdr;
        }
        match cdr.kind {
            DatumKind::List(rest) => {
                car.extend(rest);
                Datum::new(DatumKind::List(car), position)
            }
            DatumKind::Pair { car: rest, cdr } => {
                car.extend(rest);
                Datum::new(DatumKind::Pair { car, cdr }, position)
            }
            kind => Datum::new(
                DatumKind::Pair {
                    car,
                    cdr: Box::new(Datum::new(kind, cdr.position)),
                },
                position,
            ),
        }
    }

    pub fn symbol(&self) -> Option<&str> {
        match self.kind {
            DatumKind::Symbol(ref s) => Some(&s[..]),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&[Datum]> {
        match self.kind {
            DatumKind::List(ref l) => Some(&l[..]),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        self.symbol() == Some(name)
    }
}

fn write_sequence(fmt: &mut fmt::Formatter, datums: &[Datum]) -> fmt::Result {
    for (i, d) in datums.iter().enumerate() {
        if i > 0 {
            fmt.write_str(" ")?;
        }
        write!(fmt, "{}", d)?;
    }
    Ok(())
}

impl fmt::Display for Datum {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            DatumKind::List(ref ds) => {
                fmt.write_str("(")?;
                write_sequence(fmt, ds)?;
                fmt.write_str(")")
            }
            DatumKind::Vector(ref ds) => {
                fmt.write_str("#(")?;
                write_sequence(fmt, ds)?;
                fmt.write_str(")")
            }
            DatumKind::ByteVector(ref bytes) => {
                fmt.write_str("#u8(")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        fmt.write_str(" ")?;
                    }
                    write!(fmt, "{}", b)?;
                }
                fmt.write_str(")")
            }
            DatumKind::Boolean(b) => fmt.write_str(if b { "#t" } else { "#f" }),
            DatumKind::Integer(n) => write!(fmt, "{}", n),
            DatumKind::Float(f) => write!(fmt, "{:?}", f),
            DatumKind::Pair { ref car, ref cdr } => {
                fmt.write_str("(")?;
                write_sequence(fmt, car)?;
                fmt.write_str(" . ")?;
                write!(fmt, "{}", cdr)?;
                fmt.write_str(")")
            }
            DatumKind::Symbol(ref s) => fmt.write_str(&s[..]),
            DatumKind::String(ref s) => fmt.write_str(&string_literal(s)),
            DatumKind::Character(c) => fmt.write_str(&char_literal(c)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::read;

    fn read_one(text: &str) -> Result<Datum, ReaderError> {
        let mut datums = read(text, None)?;
        assert_eq!(datums.len(), 1, "expected a single datum in {:?}", text);
        Ok(datums.remove(0))
    }

    fn kind(text: &str) -> DatumKind {
        read_one(text).expect("valid datum").kind
    }

    fn sym(s: &str) -> Datum {
        Datum::new(DatumKind::Symbol(s.to_string()), Position::default())
    }

    fn int(n: i64) -> Datum {
        Datum::new(DatumKind::Integer(n), Position::default())
    }

    #[test]
    fn boolean_datum_test() {
        assert_eq!(kind("#f"), DatumKind::Boolean(false));
    }

    #[test]
    fn list_test() {
        assert_eq!(kind("(a 1)"), DatumKind::List(vec![sym("a"), int(1)]));
        assert_eq!(kind("()"), DatumKind::List(vec![]));
    }

    #[test]
    fn list_pair_test() {
        assert_eq!(
            kind("(a . 2)"),
            DatumKind::Pair {
                car: vec![sym("a")],
                cdr: Box::new(int(2)),
            }
        );
    }

    #[test]
    fn dotted_list_is_flattened() {
        assert_eq!(kind("(a . (b c))"), DatumKind::List(vec![sym("a"), sym("b"), sym("c")]));
        assert_eq!(
            kind("(a . (b . c))"),
            DatumKind::Pair {
                car: vec![sym("a"), sym("b")],
                cdr: Box::new(sym("c")),
            }
        );
    }

    #[test]
    fn incomplete_list_test() {
        assert!(match read("(foo", None) {
            Err(ReaderError::UnexpectedEOF(_)) => true,
            _ => false,
        });
    }

    #[test]
    fn empty_head_list_test() {
        assert!(match read("(. a)", None) {
            Err(ReaderError::UnexpectedListToken(_)) => true,
            _ => false,
        });
    }

    #[test]
    fn empty_tail_list_test() {
        assert!(read("(a .)", None).is_err());
    }

    #[test]
    fn double_tail_list_test() {
        assert!(read("(a . #t \"foo\")", None).is_err());
    }

    #[test]
    fn vector_test() {
        assert_eq!(
            kind("#(#t 1)"),
            DatumKind::Vector(vec![Datum::new(DatumKind::Boolean(true), Position::default()), int(1)])
        );
        assert_eq!(kind("#u8(0 255)"), DatumKind::ByteVector(vec![0, 255]));
        assert!(read("#u8(256)", None).is_err());
    }

    #[test]
    fn abbreviation_test() {
        assert_eq!(
            kind("`(foo ,bar)"),
            DatumKind::List(vec![
                sym("quasiquote"),
                Datum::new(
                    DatumKind::List(vec![
                        sym("foo"),
                        Datum::new(DatumKind::List(vec![sym("unquote"), sym("bar")]), Position::default()),
                    ]),
                    Position::default()
                ),
            ])
        );
    }

    #[test]
    fn incomplete_abbreviation_test() {
        assert!(read("'(", None).is_err());
        assert!(read("'", None).is_err());
    }

    #[test]
    fn datum_comment_test() {
        assert_eq!(kind("(a #;(b c) d #;e)"), DatumKind::List(vec![sym("a"), sym("d")]));
        assert_eq!(read("#;1 2 #;3", None).map(|v| v.len()), Ok(1));
    }

    #[test]
    fn unexpected_close_test() {
        assert!(match read(")", None) {
            Err(ReaderError::UnexpectedToken(_)) => true,
            _ => false,
        });
    }

    #[test]
    fn positions_test() {
        let datum = read_one("(a\n (b c))").expect("valid datum");
        let inner = &datum.list().expect("a list")[1];
        assert_eq!(inner.position.line(), 1);
        assert_eq!(inner.position.column(), 1);
    }

    #[test]
    fn display_round_trip_test() {
        for text in &[
            "(a \"b\\n\" #\\space 1 2.5 #(x) #u8(1 2))",
            "(1 2 . 3)",
            "(quote x)",
        ] {
            assert_eq!(&read_one(text).expect("valid datum").to_string(), text);
        }
    }

    #[test]
    fn nesting_limit_test() {
        let deep = format!("{}{}", "(".repeat(50_000), ")".repeat(50_000));
        let error = read(&deep, None).unwrap_err();
        assert!(match error {
            ReaderError::TooDeep(_) => true,
            _ => false,
        });
        assert_eq!(error.to_string(), "Expression too deeply nested.");

        let quoted = format!("{}x", "'".repeat(50_000));
        assert!(read(&quoted, None).is_err());

        let comments = format!("{}x", "#;".repeat(50_000));
        assert!(read(&comments, None).is_err());

        let shallow = format!("{}{}", "(".repeat(100), ")".repeat(100));
        assert!(read(&shallow, None).is_ok());
    }
}
