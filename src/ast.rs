//! # Abstract Syntax Tree (AST) Types
//!
//! The parser builds a [`Program`] from the token stream. Every node family
//! here is a tagged union (a discriminant plus payload) rather than a class
//! hierarchy, so the compiler walks them with an exhaustive `match`.
//!
//! ## Type hierarchy
//! ```text
//! Program
//!   ├── bpm: u32
//!   ├── instruments: Vec<Instrument>
//!   ├── patterns: Vec<Pattern>
//!   ├── tracks: Vec<Track>
//!   ├── sequence: Option<Vec<SequenceItem>>
//!   └── settings: GlobalSettings (swing, loop_bars, grid)
//!
//! SequenceItem (enum)
//!   ├── Note { pitch, duration, velocity }
//!   ├── Rest { duration }
//!   ├── Chord { pitches, duration, velocity }
//!   ├── RepeatBlock { count, items }
//!   └── PatternUse { name, repetitions }
//! ```

use crate::music::{DurationFraction, Pitch};
use serde::Serialize;

/// Oscillator waveform recognized by an [`Instrument`] directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Case-insensitive match against the four recognized waveform names.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" => Some(Waveform::Sawtooth),
            "triangle" => Some(Waveform::Triangle),
            _ => None,
        }
    }
}

/// Attack-Decay-Sustain-Release envelope parameters.
///
/// Any one of the four keys appearing in an `inst` directive implies all
/// four are set; omitted sub-fields are filled with these defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Adsr {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl Default for Adsr {
    fn default() -> Self {
        Adsr {
            attack: 0.005,
            decay: 0.05,
            sustain: 0.7,
            release: 0.08,
        }
    }
}

/// An `inst` directive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub name: String,
    pub waveform: Waveform,
    pub gain: Option<f64>,
    pub adsr: Option<Adsr>,
}

/// A `pattern` definition.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub items: Vec<SequenceItem>,
}

/// A `track` definition.
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub instrument: String,
    pub items: Vec<SequenceItem>,
    /// Position of the instrument-name token, kept for reference-error
    /// reporting if `instrument` turns out to be undefined.
    pub instrument_line: usize,
    pub instrument_column: usize,
}

/// Global settings resolved from `swing`, `loop`, and `grid` directives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    pub swing: f64,
    pub loop_bars: u32,
    pub grid: u16,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        GlobalSettings {
            swing: 0.0,
            loop_bars: 1,
            grid: 16,
        }
    }
}

/// One item within a `seq:`, `pattern:`, or `track:` body.
#[derive(Debug, Clone)]
pub enum SequenceItem {
    Note {
        pitch: Pitch,
        duration: DurationFraction,
        velocity: Option<f64>,
    },
    Rest {
        duration: DurationFraction,
    },
    Chord {
        pitches: Vec<Pitch>,
        duration: DurationFraction,
        velocity: Option<f64>,
    },
    RepeatBlock {
        count: u32,
        items: Vec<SequenceItem>,
    },
    PatternUse {
        name: String,
        repetitions: u32,
        /// Position of the pattern-name token, kept for reference-error
        /// reporting if `name` turns out to be undefined.
        line: usize,
        column: usize,
    },
}

/// The parsed, immutable program. Produced once by the parser and consumed
/// by the compiler; never mutated afterward.
#[derive(Debug, Clone)]
pub struct Program {
    pub bpm: u32,
    pub instruments: Vec<Instrument>,
    pub patterns: Vec<Pattern>,
    pub tracks: Vec<Track>,
    pub sequence: Option<Vec<SequenceItem>>,
    pub settings: GlobalSettings,
}

impl Program {
    /// The implicit default instrument synthesized when no `inst` directive
    /// appears: `{name: "lead", waveform: sine}`.
    pub fn default_instrument() -> Instrument {
        Instrument {
            name: "lead".to_string(),
            waveform: Waveform::Sine,
            gain: None,
            adsr: None,
        }
    }
}
