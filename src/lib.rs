//! `pl0` library crate.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the AST (`ast`), reporting into
//!   the shared `diagnostics` sink
//! - `codegen` drives the `symtab` scopes and lowers the AST to the linear
//!   `pcode` instruction format
//! - `vm` executes an instruction sequence over injected I/O streams
//! - `driver` wires the pipeline together for the CLI in `main`
pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod driver;
pub mod lexer;
pub mod parser;
pub mod pcode;
pub mod symtab;
pub mod token;
pub mod vm;
