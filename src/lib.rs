//! Bytecode disassembly and structural visitor engine for JVM class files.
//!
//! [`ClassFile::parse`] reads a class into an owned model, [`traverse`] walks it
//! in a fixed order and reports every node and decoded instruction to a
//! [`Visitor`]. [`listing`] is the built-in visitor used by the CLI.

pub mod annotation;
pub mod attributes;
pub mod classfile;
pub mod config;
pub mod constant_pool;
pub mod decoder;
pub mod descriptor;
pub mod error;
pub mod listing;
pub mod logging;
pub mod opcodes;
pub mod operands;
pub(crate) mod reader;
pub mod scan;
pub mod visitor;

#[cfg(test)]
pub(crate) mod test_harness;

pub use classfile::ClassFile;
pub use config::VisitorConfig;
pub use error::{AnnotationError, ClassFormatError, DecodeError, NotAvailable};
pub use listing::{ClassListing, list_class};
pub use visitor::{Node, NodeKind, TraversalReport, VisitOutcome, Visitor, VisitorContext, traverse};
