//! Front end for a small expression language: positioned tokens, a
//! combinator parser, and lowering of the AST into basic blocks with phi
//! merges through a pluggable code generation backend.

pub mod ast;
pub mod backend;
pub mod codegen;
pub mod error;
pub mod interp;
pub mod ir;
pub mod lexer;
#[cfg(feature = "llvm")]
pub mod llvm;
pub mod parser;
pub mod token;
pub mod toplevel;
pub mod verify;

pub use error::{Error, ErrorKind, Result};
pub use parser::{parse_expr, parse_program};
pub use toplevel::{run, Options, Session};
