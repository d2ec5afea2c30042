//! # Music Primitives
//!
//! Two pure, independently testable building blocks used throughout the
//! compiler: pitch-to-frequency conversion (12-TET, A4 = 440 Hz) and
//! duration-fraction-to-seconds conversion at a given tempo.
//!
//! Neither function touches position information — callers that need a
//! `(line, column)`-carrying [`CompileError`](crate::CompileError) wrap the
//! plain [`String`] reasons returned here.

use std::fmt;

/// A natural note letter, A through G.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteLetter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteLetter {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(NoteLetter::C),
            'D' => Some(NoteLetter::D),
            'E' => Some(NoteLetter::E),
            'F' => Some(NoteLetter::F),
            'G' => Some(NoteLetter::G),
            'A' => Some(NoteLetter::A),
            'B' => Some(NoteLetter::B),
            _ => None,
        }
    }

    /// Semitone offset from C within an octave: C D E F G A B -> 0 2 4 5 7 9 11.
    fn semitone(self) -> i32 {
        match self {
            NoteLetter::C => 0,
            NoteLetter::D => 2,
            NoteLetter::E => 4,
            NoteLetter::F => 5,
            NoteLetter::G => 7,
            NoteLetter::A => 9,
            NoteLetter::B => 11,
        }
    }
}

impl fmt::Display for NoteLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            NoteLetter::C => 'C',
            NoteLetter::D => 'D',
            NoteLetter::E => 'E',
            NoteLetter::F => 'F',
            NoteLetter::G => 'G',
            NoteLetter::A => 'A',
            NoteLetter::B => 'B',
        };
        write!(f, "{c}")
    }
}

/// An accidental modifying a [`NoteLetter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accidental {
    #[default]
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    fn delta(self) -> i32 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        }
    }
}

impl fmt::Display for Accidental {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accidental::Natural => Ok(()),
            Accidental::Sharp => write!(f, "#"),
            Accidental::Flat => write!(f, "b"),
        }
    }
}

/// A pitch: letter + accidental + octave, e.g. `C#4`.
///
/// `MIDI = 12*(octave+1) + semitone(letter) + delta(accidental)`.
/// Octave is constrained to `[0, 9]` (enforced by [`Pitch::parse`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    pub letter: NoteLetter,
    pub accidental: Accidental,
    pub octave: u8,
}

impl Pitch {
    /// Parse a lexeme matching `[A-Ga-g][#b]?\d+`, e.g. `"C4"`, `"F#3"`, `"Bb5"`.
    ///
    /// Rejects unknown letters and octaves outside `[0, 9]`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let mut chars = s.chars();
        let letter_ch = chars
            .next()
            .ok_or_else(|| "Empty pitch".to_string())?;
        let letter = NoteLetter::from_char(letter_ch)
            .ok_or_else(|| format!("Unknown note letter '{letter_ch}'"))?;

        let rest: String = chars.collect();
        let (accidental, digits) = match rest.strip_prefix('#') {
            Some(d) => (Accidental::Sharp, d),
            None => match rest.strip_prefix('b') {
                Some(d) => (Accidental::Flat, d),
                None => (Accidental::Natural, rest.as_str()),
            },
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("Invalid octave in pitch '{s}'"));
        }
        let octave: u32 = digits
            .parse()
            .map_err(|_| format!("Invalid octave in pitch '{s}'"))?;
        if octave > 9 {
            return Err(format!("Octave {octave} out of range [0, 9]"));
        }

        Ok(Pitch {
            letter,
            accidental,
            octave: octave as u8,
        })
    }

    /// MIDI note number. May fall outside `[0, 127]` for extreme octaves;
    /// callers are expected to have validated the octave range at parse time.
    pub fn midi(&self) -> i32 {
        12 * (self.octave as i32 + 1) + self.letter.semitone() + self.accidental.delta()
    }

    /// Frequency in Hz under 12-TET with A4 = 440 Hz.
    pub fn freq(&self) -> f64 {
        440.0 * 2f64.powf((self.midi() - 69) as f64 / 12.0)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.letter, self.accidental, self.octave)
    }
}

/// `pitchToMidi` — MIDI note number for a pitch.
pub fn pitch_to_midi(pitch: &Pitch) -> i32 {
    pitch.midi()
}

/// `pitchToFreq` — frequency in Hz for a pitch.
pub fn pitch_to_freq(pitch: &Pitch) -> f64 {
    pitch.freq()
}

/// A positive rational duration `n/d`, interpreted as a fraction of a whole
/// note (`1/1` = four quarter-note beats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationFraction {
    pub numerator: u32,
    pub denominator: u32,
}

impl DurationFraction {
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, String> {
        if numerator == 0 || denominator == 0 {
            return Err("Duration numerator and denominator must be positive".to_string());
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    fn as_fraction_of_whole(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl fmt::Display for DurationFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// `durationSeconds(n/d, bpm)` = `(n/d) * 4 * 60 / bpm` = `(n/d) * 240 / bpm`.
///
/// `bpm` must be strictly positive.
pub fn duration_seconds(duration: DurationFraction, bpm: f64) -> Result<f64, String> {
    if bpm <= 0.0 {
        return Err(format!("bpm must be positive, got {bpm}"));
    }
    Ok(duration.as_fraction_of_whole() * 240.0 / bpm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_to_freq_a4() {
        let a4 = Pitch::parse("A4").unwrap();
        assert!((pitch_to_freq(&a4) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_to_midi_c4() {
        let c4 = Pitch::parse("C4").unwrap();
        assert_eq!(pitch_to_midi(&c4), 60);
    }

    #[test]
    fn test_sharp_flat_enharmonic_equivalence() {
        let cs4 = Pitch::parse("C#4").unwrap();
        let db4 = Pitch::parse("Db4").unwrap();
        assert_eq!(pitch_to_midi(&cs4), 61);
        assert_eq!(pitch_to_midi(&db4), 61);
    }

    #[test]
    fn test_octave_out_of_range_rejected() {
        assert!(Pitch::parse("C10").is_err());
    }

    #[test]
    fn test_unknown_letter_rejected() {
        assert!(Pitch::parse("H4").is_err());
    }

    #[test]
    fn test_duration_seconds_quarter_at_120() {
        let d = DurationFraction::new(1, 4).unwrap();
        assert_eq!(duration_seconds(d, 120.0).unwrap(), 0.5);
    }

    #[test]
    fn test_duration_seconds_whole_at_60() {
        let d = DurationFraction::new(1, 1).unwrap();
        assert_eq!(duration_seconds(d, 60.0).unwrap(), 4.0);
    }

    #[test]
    fn test_duration_rejects_zero() {
        assert!(DurationFraction::new(0, 4).is_err());
        assert!(DurationFraction::new(4, 0).is_err());
    }

    #[test]
    fn test_duration_seconds_rejects_nonpositive_bpm() {
        let d = DurationFraction::new(1, 4).unwrap();
        assert!(duration_seconds(d, 0.0).is_err());
        assert!(duration_seconds(d, -10.0).is_err());
    }
}
