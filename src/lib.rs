//! An embeddable Scheme-family scripting runtime
#[macro_use]
extern crate log;

#[macro_use]
mod helpers;

pub mod compiler;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod reader;
pub mod vm;

pub use crate::error::{ErrorKind, Position, ScriptError};
pub use crate::interpreter::{Evaluator, EvaluatorOptions};
pub use crate::vm::{HostObject, Value, Variant};
