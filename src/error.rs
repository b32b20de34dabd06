use super::token::Position;
use failure::{Backtrace, Context, Fail};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "syntax error at {}: {}", position, message)]
    Syntax { position: Position, message: String },

    #[fail(display = "unbound name '{}'", _0)]
    UnboundName(String),

    #[fail(display = "unknown function '{}'", _0)]
    UnknownFunction(String),

    #[fail(display = "unknown operator '{}'", _0)]
    UnknownOperator(char),

    #[fail(
        display = "function '{}' expects {} argument(s), got {}",
        name, expected, found
    )]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[fail(display = "function '{}' is already defined", _0)]
    DuplicateFunction(String),

    #[fail(display = "function '{}' repeats parameter '{}'", function, name)]
    DuplicateParameter { function: String, name: String },

    #[fail(display = "function '{}' failed verification: {}", function, reason)]
    Verification { function: String, reason: String },

    #[fail(display = "execution failed: {}", _0)]
    Execution(String),

    #[fail(display = "backend error: {}", _0)]
    Backend(String),

    #[fail(display = "I/O error")]
    Io,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)?;
        if let Some(cause) = self.inner.cause() {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}
