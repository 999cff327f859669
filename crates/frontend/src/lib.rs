//! A front end for a small stack bytecode.
//!
//! [`analyze`] turns a [`MethodDecl`] into an [`ir::MethodBody`], and a
//! [`CompilationUnit`] owns many declarations and builds their bodies on
//! demand.
mod analyzer;
mod config;
mod error;
mod op;
mod unit;

pub use analyzer::analyze;
pub use config::FrontendConfig;
pub use error::FrontendError;
pub use op::{MethodDecl, Op};
pub use unit::CompilationUnit;
