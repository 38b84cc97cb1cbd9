/// A character cursor over the whole source, tracking lines as it advances
#[derive(Debug)]
pub struct Chars {
    vec: Vec<char>,
    index: usize,
    line: usize,
    line_start: usize,
}

/// Where a token starts: character offset, zero-based line and the offset of
/// that line's first character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub index: usize,
    pub line: usize,
    pub line_start: usize,
}

impl Iterator for Chars {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        let c = self.peek(0)?;
        self.index += 1;
        if c == '\n' {
            self.line += 1;
            self.line_start = self.index;
        }
        Some(c)
    }
}

impl Chars {
    pub fn peek(&self, i: usize) -> Option<char> {
        self.vec.get(self.index + i).cloned()
    }

    pub fn advance(&mut self, n: usize) {
        for _ in 0..n {
            let _ = self.next();
        }
    }

    pub fn location(&self) -> Location {
        Location {
            index: self.index,
            line: self.line,
            line_start: self.line_start,
        }
    }

    pub fn from_vec(v: Vec<char>) -> Chars {
        Chars {
            vec: v,
            index: 0,
            line: 0,
            line_start: 0,
        }
    }

    pub fn from_str(s: &str) -> Chars {
        Chars::from_vec(s.chars().collect())
    }
}
