use combine::stream::position::SourcePosition;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Def,
    If,
    Then,
    Else,
    Ident(String),
    Number(f64),
    Kwd(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::If => write!(f, "if"),
            Token::Then => write!(f, "then"),
            Token::Else => write!(f, "else"),
            Token::Ident(id) => write!(f, "{}", id),
            Token::Number(n) => write!(f, "{}", n),
            Token::Kwd(c) => write!(f, "{}", c),
        }
    }
}

/// 1-based line/column of a token in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl From<SourcePosition> for Position {
    fn from(p: SourcePosition) -> Position {
        Position {
            line: p.line.max(0) as u32,
            column: p.column.max(0) as u32,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: Position,
}
