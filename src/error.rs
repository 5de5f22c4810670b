use thiserror::Error;

use crate::{CompileError, ParseError, RuntimeError};

/// Top-level error for driving a source string through the whole pipeline.
///
/// The variants mirror the pipeline stages: a parse failure carries every
/// diagnostic the parser recovered past, while compile and runtime failures
/// are fatal on the first error.
#[derive(Debug, Error)]
pub enum Error {
    /// The scanner or parser rejected the source
    #[error("parse failed with {} error(s)", .0.len())]
    Parse(Vec<ParseError>),
    /// The compiler rejected the statement tree
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Execution halted on a runtime error
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
