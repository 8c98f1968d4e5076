//! Elaboration core for a VHDL-like hardware description language.
//!
//! Analyzed designs are represented as a [`tree`] intermediate
//! representation, stored in an on-disk [`library`], and flattened by
//! [`elab`] into a single netlist-bearing `ELAB` unit.

pub mod diag;
pub mod elab;
pub mod ident;
pub mod library;
pub mod loc;
pub mod options;
pub mod tree;
pub mod types;

pub use diag::{Diagnostic, Diagnostics, Severity};
pub use ident::Ident;
pub use library::Library;
pub use loc::Loc;
pub use tree::{Kind, Tree};
