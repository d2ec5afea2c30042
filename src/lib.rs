//! # Cadence
//!
//! A compiler and real-time scheduler for a small music-sequencer DSL.
//!
//! ## Compilation pipeline
//!
//! ```text
//! source text → Lexer → Parser → Compiler → CompilationResult (sorted events)
//! ```
//!
//! 1. **Lexer** ([`lexer`]) — tokenizes source into a flat, positioned token stream.
//! 2. **Parser** ([`parser`]) — recursive-descent parse into a [`Program`].
//! 3. **Compiler** ([`compiler`]) — expands patterns/repeats/chords, resolves
//!    instrument references, applies swing, and produces a sorted [`Event`] list.
//! 4. **Scheduler** ([`scheduler`]) — drives an [`AudioBackend`](scheduler::AudioBackend)
//!    from the compiled events with lookahead, looping, and mute/solo.
//!
//! Components 1–3 are pure and deterministic; only the scheduler touches
//! wall-clock time, and only through a host-supplied clock.
//!
//! ## Quick start
//!
//! ```rust
//! use cadence::compile_source;
//!
//! let source = "bpm 120\nseq: C4 1/4, D4 1/4";
//! let result = compile_source(source)?;
//! assert_eq!(result.events.len(), 2);
//! assert_eq!(result.events[0].midi, Some(60));
//! # Ok::<(), cadence::CompileError>(())
//! ```
//!
//! ## DSL syntax overview
//!
//! - `bpm 120` — tempo (beats = quarter notes).
//! - `inst lead sine gain=0.8 attack=0.01` — oscillator + envelope.
//! - `seq: C4 1/4, D4 1/4` — a sequence of notes (`pitch duration`).
//! - `r 1/4` — a rest.
//! - `[C4 E4 G4] 1/2` — a chord (simultaneous notes, one shared duration).
//! - `x4 { C4 1/8 }` — a repeat block.
//! - `pattern riff: C4 1/8, D4 1/8` / `use riff x2` — named, repeatable patterns.
//! - `track bass inst=bass: C2 1/2` — a concurrent, independently-timed track.
//! - `swing 0.5`, `grid 16`, `loop 2` — global timing settings.
//!
//! Directives may appear in any order; `bpm` defaults to 120 and a missing
//! `inst` directive synthesizes `{name: "lead", waveform: sine}`. See the
//! `tests/` suite alongside each module for worked examples of every
//! construct (patterns, repeat blocks, chords, tracks, swing).
//!
//! ## Module structure
//!
//! - [`error`] — [`CompileError`] and its [`ErrorKind`] taxonomy.
//! - [`music`] — pitch/duration primitives ([`pitch_to_midi`], [`duration_seconds`], ...).
//! - [`ast`] — the parsed [`Program`] and its tagged-union node types.
//! - [`lexer`] — tokenization.
//! - [`parser`] — token stream → [`Program`].
//! - [`compiler`] — [`Program`] → [`CompilationResult`]; also [`apply_swing`].
//! - [`scheduler`] — [`Scheduler`] transport and the [`AudioBackend`](scheduler::AudioBackend) trait.

pub mod ast;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod music;
pub mod parser;
pub mod scheduler;

pub use ast::{Adsr, GlobalSettings, Instrument, Pattern, Program, SequenceItem, Track, Waveform};
pub use compiler::{apply_swing, compile, CompilationResult, Event, EventKind, DEFAULT_VELOCITY};
pub use error::{CompileError, ErrorKind};
pub use music::{duration_seconds, pitch_to_freq, pitch_to_midi, DurationFraction, Pitch};
pub use scheduler::{
    AudioBackend, Scheduler, SchedulerConfig, TransportSnapshot, DEFAULT_TRACK, LOOKAHEAD_MS,
    SCHEDULE_AHEAD_SEC,
};

use lexer::Lexer;
use parser::Parser;

/// End-to-end compile: source text → tokens → [`Program`] → [`CompilationResult`].
///
/// Returns the first diagnostic encountered (the compiler never accumulates
/// more than one error; see [`CompileError`]).
///
/// # Examples
/// ```
/// use cadence::compile_source;
///
/// assert!(compile_source("").is_ok()); // defaults: bpm 120, no events
/// assert!(compile_source("bpm -5").is_err());
/// ```
pub fn compile_source(source: &str) -> Result<CompilationResult, CompileError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse()?;
    compile(&program)
}
