use super::TokenErrorClass;

/// The value of a number literal
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Integer(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Exactness {
    Exact,
    Inexact,
}

/// Does this atom look like it was meant to be a number?
pub fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('0'..='9'), _) => true,
        (Some('+'), Some(c)) | (Some('-'), Some(c)) => c.is_ascii_digit() || c == '.' && text.len() > 2,
        (Some('.'), Some(c)) => c.is_ascii_digit(),
        (Some('#'), Some(c)) => match c.to_ascii_lowercase() {
            'x' | 'b' | 'o' | 'd' | 'e' | 'i' => true,
            _ => false,
        },
        _ => false,
    }
}

/// Parses a complete number literal, prefixes included
pub fn parse_number(text: &str) -> Result<Num, TokenErrorClass> {
    let mut radix = None;
    let mut exactness = None;
    let mut rest = text;

    while rest.starts_with('#') {
        let marker = rest[1..]
            .chars()
            .next()
            .ok_or(TokenErrorClass::BadMarker)?
            .to_ascii_lowercase();
        match marker {
            'x' | 'b' | 'o' | 'd' if radix.is_none() => {
                radix = Some(match marker {
                    'x' => 16,
                    'b' => 2,
                    'o' => 8,
                    _ => 10,
                })
            }
            'e' if exactness.is_none() => exactness = Some(Exactness::Exact),
            'i' if exactness.is_none() => exactness = Some(Exactness::Inexact),
            _ => return Err(TokenErrorClass::BadMarker),
        }
        rest = &rest[2..];
    }

    check!(!rest.is_empty(), TokenErrorClass::EmptyNumber);

    let num = parse_real(rest, radix.unwrap_or(10))?;

    match (exactness, num) {
        (Some(Exactness::Inexact), Num::Integer(n)) => Ok(Num::Float(n as f64)),
        (Some(Exactness::Exact), Num::Float(f)) => {
            check!(
                f.fract() == 0.0 && f.abs() < i64::max_value() as f64,
                TokenErrorClass::BadExactness
            );
            Ok(Num::Integer(f as i64))
        }
        (_, num) => Ok(num),
    }
}

fn parse_real(text: &str, radix: u32) -> Result<Num, TokenErrorClass> {
    let (negative, digits) = match text.chars().next() {
        Some('-') => (true, &text[1..]),
        Some('+') => (false, &text[1..]),
        _ => (false, text),
    };

    check!(!digits.is_empty(), TokenErrorClass::EmptyNumber);

    if radix != 10 {
        check!(
            digits.chars().all(|c| c.is_digit(radix)),
            TokenErrorClass::BadDigit
        );
        let n = i64::from_str_radix(digits, radix).map_err(|_| TokenErrorClass::Overflow)?;
        return Ok(Num::Integer(if negative { -n } else { n }));
    }

    if digits.chars().all(|c| c.is_ascii_digit()) {
        let n: i64 = digits.parse().map_err(|_| TokenErrorClass::Overflow)?;
        return Ok(Num::Integer(if negative { -n } else { n }));
    }

    validate_decimal(digits)?;
    let f: f64 = digits.parse().map_err(|_| TokenErrorClass::BadDecimal)?;
    Ok(Num::Float(if negative { -f } else { f }))
}

// digits [. digits] [e [sign] digits], with at least one mantissa digit
fn validate_decimal(text: &str) -> Result<(), TokenErrorClass> {
    let (mantissa, exponent) = match text.find(|c| c == 'e' || c == 'E') {
        Some(i) => (&text[..i], Some(&text[i + 1..])),
        None => (text, None),
    };

    let mut dots = 0;
    let mut mantissa_digits = 0;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => mantissa_digits += 1,
            '.' => dots += 1,
            _ => return Err(TokenErrorClass::BadDigit),
        }
    }
    check!(dots <= 1 && mantissa_digits > 0, TokenErrorClass::BadDecimal);

    if let Some(exponent) = exponent {
        let exponent = exponent.trim_start_matches(|c| c == '+' || c == '-');
        check!(
            !exponent.is_empty() && exponent.chars().all(|c| c.is_ascii_digit()),
            TokenErrorClass::BadSuffix
        );
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integers() {
        assert_eq!(parse_number("42"), Ok(Num::Integer(42)));
        assert_eq!(parse_number("-17"), Ok(Num::Integer(-17)));
        assert_eq!(parse_number("+3"), Ok(Num::Integer(3)));
    }

    #[test]
    fn radix_prefixes() {
        assert_eq!(parse_number("#xff"), Ok(Num::Integer(255)));
        assert_eq!(parse_number("#X-A"), Ok(Num::Integer(-10)));
        assert_eq!(parse_number("#b101"), Ok(Num::Integer(5)));
        assert_eq!(parse_number("#o17"), Ok(Num::Integer(15)));
        assert_eq!(parse_number("#b102"), Err(TokenErrorClass::BadDigit));
    }

    #[test]
    fn decimals() {
        assert_eq!(parse_number("1.5"), Ok(Num::Float(1.5)));
        assert_eq!(parse_number(".5"), Ok(Num::Float(0.5)));
        assert_eq!(parse_number("-2."), Ok(Num::Float(-2.0)));
        assert_eq!(parse_number("1e3"), Ok(Num::Float(1000.0)));
        assert_eq!(parse_number("2.5E-1"), Ok(Num::Float(0.25)));
        assert_eq!(parse_number("1.2.3"), Err(TokenErrorClass::BadDecimal));
        assert_eq!(parse_number("1e"), Err(TokenErrorClass::BadSuffix));
    }

    #[test]
    fn exactness() {
        assert_eq!(parse_number("#i3"), Ok(Num::Float(3.0)));
        assert_eq!(parse_number("#e2.0"), Ok(Num::Integer(2)));
        assert_eq!(parse_number("#e2.5"), Err(TokenErrorClass::BadExactness));
        assert_eq!(parse_number("#x#x1"), Err(TokenErrorClass::BadMarker));
    }

    #[test]
    fn overflow() {
        assert_eq!(
            parse_number("99999999999999999999"),
            Err(TokenErrorClass::Overflow)
        );
    }

    #[test]
    fn numeric_lookalikes() {
        assert!(looks_numeric("12abc"));
        assert!(looks_numeric("-.5"));
        assert!(!looks_numeric("-"));
        assert!(!looks_numeric("->x"));
        assert!(!looks_numeric("..."));
    }
}
