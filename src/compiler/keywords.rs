pub const IF: &'static str = "if";
pub const SET_BANG: &'static str = "set!";
pub const QUOTE: &'static str = "quote";
pub const BEGIN: &'static str = "begin";
pub const DEFINE: &'static str = "define";
pub const LAMBDA: &'static str = "lambda";
pub const QUASIQUOTE: &'static str = "quasiquote";
pub const LET_SYNTAX: &'static str = "let-syntax";
pub const DEFINE_SYNTAX: &'static str = "define-syntax";
pub const LETREC_SYNTAX: &'static str = "letrec-syntax";

pub const SYNTAX_RULES: &'static str = "syntax-rules";
pub const IDENTIFIER_SYNTAX: &'static str = "identifier-syntax";

// Auxiliary syntax, bound as literals in the global scope
pub const ELSE: &'static str = "else";
pub const ARROW: &'static str = "=>";
pub const UNDERSCORE: &'static str = "_";
pub const ELLIPSIS: &'static str = "...";
pub const UNQUOTE: &'static str = "unquote";
pub const UNQUOTE_SPLICING: &'static str = "unquote-splicing";

pub const AUXILIARY: [&'static str; 6] = [ELSE, ARROW, UNDERSCORE, ELLIPSIS, UNQUOTE, UNQUOTE_SPLICING];

macro_rules! one_of {
    ($x:expr, [$c:expr]) => ($x == $c);
    ($x:expr, [ $c:expr, $( $d:expr ),* ]) => (
        $x == $c || one_of!($x, [$( $d ),* ])
    )
}

/// Names whose list forms the compiler handles itself
pub fn is_special_form(name: &str) -> bool {
    match name.len() {
        2 => one_of!(name, [IF]),
        4 => one_of!(name, [SET_BANG]),
        5 => one_of!(name, [QUOTE, BEGIN]),
        6 => one_of!(name, [DEFINE, LAMBDA]),
        10 => one_of!(name, [QUASIQUOTE, LET_SYNTAX]),
        13 => one_of!(name, [DEFINE_SYNTAX, LETREC_SYNTAX]),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn special_forms() {
        assert!(is_special_form("letrec-syntax"));
        assert!(is_special_form("set!"));
        assert!(!is_special_form("let"));
        assert!(!is_special_form("else"));
    }
}
