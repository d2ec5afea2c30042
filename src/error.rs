//! # Error Types
//!
//! Every failure in the lexer, parser, and compiler carries a 1-based
//! `(line, column)` position plus a human-readable message, so a host can
//! point a user at the exact offending character. Errors are grouped into
//! four kinds (lexical, syntactic, value, reference) purely for diagnostic
//! classification; the host-facing shape is identical across kinds.
//!
//! ## Usage
//! ```rust
//! use cadence::compile_source;
//!
//! match compile_source("bpm -1") {
//!     Ok(_) => {}
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

use thiserror::Error;

/// Coarse classification of a [`CompileError`], matching the spec's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected character, invalid token word.
    Lexical,
    /// Missing expected token, duplicate directive, unclosed bracket/block.
    Syntactic,
    /// Out-of-range value (octave, duration, velocity, gain, ADSR, swing,
    /// loop, grid, waveform, repeat count, unknown parameter name).
    Value,
    /// Reference to an undefined instrument or pattern.
    Reference,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Lexical => "Lexical",
            ErrorKind::Syntactic => "Syntactic",
            ErrorKind::Value => "Value",
            ErrorKind::Reference => "Reference",
        };
        f.write_str(s)
    }
}

/// A single compiler diagnostic.
///
/// # Example
/// ```
/// # use cadence::{CompileError, ErrorKind};
/// let err = CompileError::new(ErrorKind::Value, 3, 10, "swing must be in [0, 0.75]".to_string());
/// assert_eq!(err.to_string(), "Value error at line 3, column 10: swing must be in [0, 0.75]");
/// ```
#[derive(Error, Debug, Clone)]
#[error("{kind} error at line {line}, column {column}: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: ErrorKind, line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            message: message.into(),
        }
    }

    pub fn lexical(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lexical, line, column, message)
    }

    pub fn syntactic(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntactic, line, column, message)
    }

    pub fn value(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, line, column, message)
    }

    pub fn reference(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Reference, line, column, message)
    }
}
