//! DML rendering and application.

mod generator;
mod writer;

pub use generator::StatementGenerator;
pub use writer::{DmlWriter, ScriptFile, WriteTarget};
