use std::rc::Rc;

/// Shared, immutable text used for symbols, strings and source snippets
pub type ImmutableString = Rc<str>;

//
// Macros
//
macro_rules! ok_some {
    ($x:expr) => {
        Ok(Some($x))
    };
}

macro_rules! check {
    ($check:expr, $err:expr) => {
        if !$check {
            return Err($err);
        }
    };
}

/// `#\a` notation for a character, as the reader accepts it back
pub fn char_literal(c: char) -> String {
    let name = match c {
        '\n' => "newline".to_owned(),
        ' ' => "space".to_owned(),
        '\t' => "tab".to_owned(),
        '\r' => "return".to_owned(),
        '\0' => "nul".to_owned(),
        c if c.is_control() => format!("x{:x}", c as u32),
        c => c.to_string(),
    };
    format!("#\\{}", name)
}

/// Double-quoted string with the reader's escapes
pub fn string_literal(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len() + 2);
    escaped.push('"');
    for c in s.chars() {
        match c {
            '"' => escaped += "\\\"",
            '\\' => escaped += "\\\\",
            '\n' => escaped += "\\n",
            '\t' => escaped += "\\t",
            '\r' => escaped += "\\r",
            c => escaped.push(c),
        }
    }
    escaped.push('"');
    escaped
}
