//! Infrastructure for a bytecode virtual machine for a small Lua-flavored
//! language.
//!
//! Source text is scanned into tokens, parsed into a statement tree, lowered
//! to a linear bytecode [`Chunk`], and executed on the stack-based [`VM`].
//! The [`interpret`] helper drives the whole pipeline:
//!
//! ```
//! use minilua::{interpret, VM};
//!
//! let mut vm = VM::new(Vec::new());
//! interpret("print(1 + 2)", &mut vm).unwrap();
//! assert_eq!(vm.into_output(), b"3\n".to_vec());
//! ```

#![warn(missing_debug_implementations)]
#![deny(missing_docs)]

mod ast;
mod chunk;
mod compile;
mod error;
mod opcode;
mod parse;
mod scan;
mod token;
mod value;
mod vm;

pub use ast::*;
pub use chunk::*;
pub use compile::*;
pub use error::*;
pub use opcode::*;
pub use parse::*;
pub use scan::*;
pub use token::*;
pub use value::*;
pub use vm::*;

/// Maximum depth of the virtual machine's operand stack.
pub const MAX_STACK: usize = 256;

/// Maximum number of constants a chunk can hold; indexes are a single byte.
pub const MAX_CHUNK_CONSTANTS: usize = 256;

/// Maximum number of arguments or parameters in a call or declaration.
pub const MAX_CALL_ARGS: usize = 255;

/// Maximum distance a jump can cover with its two-byte operand.
pub const MAX_JUMP: usize = u16::MAX as usize;

/// Run a source string through scan, parse, compile, and execution on the
/// given machine.
pub fn interpret<W: std::io::Write>(src: &str, vm: &mut VM<W>) -> Result<(), Error> {
    let statements = Parser::new(src).parse().map_err(Error::Parse)?;
    let chunk = compile(&statements)?;
    vm.interpret(&chunk)?;
    Ok(())
}
