//! # Compiler
//!
//! Walks a [`Program`] into a flat, sorted [`Event`] list. The top-level
//! `seq:` block (if present) and every `track` block start their own cursor
//! at `t = 0` and are walked independently — they share the same timeline
//! on purpose (see module docs in `ast.rs` / spec §9). Patterns and repeat
//! blocks inline by letting the cursor flow across iterations; a chord
//! computes its duration once and advances the cursor once regardless of
//! how many pitches it holds.

use serde::Serialize;

use crate::ast::{Adsr, GlobalSettings, Instrument, Pattern, Program, SequenceItem, Waveform};
use crate::error::CompileError;
use crate::music::{duration_seconds, pitch_to_freq, pitch_to_midi, DurationFraction};

/// Default velocity applied to a [`SequenceItem::Note`]/`Chord` pitch when no
/// `vel = ...` suffix was parsed.
pub const DEFAULT_VELOCITY: f64 = 0.8;

/// Discriminant of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Note,
    Rest,
}

/// One scheduled sound (or silence) in the compiled timeline.
///
/// Invariant: `kind == Note` implies `midi` and `freq` are `Some`; `kind ==
/// Rest` implies both are `None` and `velocity == 0.0`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub t: f64,
    pub dur: f64,
    pub kind: EventKind,
    pub midi: Option<i32>,
    pub freq: Option<f64>,
    pub velocity: f64,
    pub instrument_name: String,
    pub waveform: Waveform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adsr: Option<Adsr>,
}

impl Event {
    /// The track name used for filtering and sort purposes: the event's own
    /// track, or the scheduler's default-track name if it has none.
    pub fn track_key(&self) -> &str {
        self.track.as_deref().unwrap_or("")
    }
}

/// Output of [`compile`]: the sorted event list plus resolved globals.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    pub events: Vec<Event>,
    pub bpm: u32,
    pub total_duration: f64,
    pub event_count: usize,
    pub settings: GlobalSettings,
}

fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| {
        a.t.partial_cmp(&b.t)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.track_key().cmp(b.track_key()))
            .then_with(|| a.midi.unwrap_or(i32::MIN).cmp(&b.midi.unwrap_or(i32::MIN)))
    });
}

struct Walker<'p> {
    bpm: f64,
    patterns: &'p std::collections::HashMap<&'p str, &'p Pattern>,
    expansion_stack: Vec<&'p str>,
    events: Vec<Event>,
}

impl<'p> Walker<'p> {
    fn walk_items(
        &mut self,
        items: &'p [SequenceItem],
        instrument: &Instrument,
        track: Option<&str>,
        cursor: &mut f64,
    ) -> Result<(), CompileError> {
        for item in items {
            match item {
                SequenceItem::Note {
                    pitch,
                    duration,
                    velocity,
                } => {
                    let dur = self.seconds(*duration);
                    self.events.push(Event {
                        t: *cursor,
                        dur,
                        kind: EventKind::Note,
                        midi: Some(pitch_to_midi(pitch)),
                        freq: Some(pitch_to_freq(pitch)),
                        velocity: velocity.unwrap_or(DEFAULT_VELOCITY),
                        instrument_name: instrument.name.clone(),
                        waveform: instrument.waveform,
                        track: track.map(str::to_string),
                        gain: instrument.gain,
                        adsr: instrument.adsr,
                    });
                    *cursor += dur;
                }
                SequenceItem::Rest { duration } => {
                    let dur = self.seconds(*duration);
                    self.events.push(Event {
                        t: *cursor,
                        dur,
                        kind: EventKind::Rest,
                        midi: None,
                        freq: None,
                        velocity: 0.0,
                        instrument_name: instrument.name.clone(),
                        waveform: instrument.waveform,
                        track: track.map(str::to_string),
                        gain: instrument.gain,
                        adsr: instrument.adsr,
                    });
                    *cursor += dur;
                }
                SequenceItem::Chord {
                    pitches,
                    duration,
                    velocity,
                } => {
                    let dur = self.seconds(*duration);
                    let t = *cursor;
                    for pitch in pitches {
                        self.events.push(Event {
                            t,
                            dur,
                            kind: EventKind::Note,
                            midi: Some(pitch_to_midi(pitch)),
                            freq: Some(pitch_to_freq(pitch)),
                            velocity: velocity.unwrap_or(DEFAULT_VELOCITY),
                            instrument_name: instrument.name.clone(),
                            waveform: instrument.waveform,
                            track: track.map(str::to_string),
                            gain: instrument.gain,
                            adsr: instrument.adsr,
                        });
                    }
                    *cursor += dur;
                }
                SequenceItem::RepeatBlock { count, items } => {
                    for _ in 0..*count {
                        self.walk_items(items, instrument, track, cursor)?;
                    }
                }
                SequenceItem::PatternUse {
                    name,
                    repetitions,
                    line,
                    column,
                } => {
                    let pattern = *self.patterns.get(name.as_str()).ok_or_else(|| {
                        CompileError::reference(*line, *column, undefined_pattern_message(name, self.patterns))
                    })?;
                    if self.expansion_stack.contains(&name.as_str()) {
                        let cycle = self
                            .expansion_stack
                            .iter()
                            .skip_while(|n| **n != name.as_str())
                            .chain(std::iter::once(&name.as_str()))
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(" -> ");
                        return Err(CompileError::reference(
                            *line,
                            *column,
                            format!("Pattern cycle detected: {cycle}"),
                        ));
                    }
                    self.expansion_stack.push(name.as_str());
                    for _ in 0..*repetitions {
                        self.walk_items(&pattern.items, instrument, track, cursor)?;
                    }
                    self.expansion_stack.pop();
                }
            }
        }
        Ok(())
    }

    /// `duration_seconds` only fails on a non-positive `n`/`d`/`bpm`, all of
    /// which the parser already rejects before a `Program` can exist.
    fn seconds(&self, duration: DurationFraction) -> f64 {
        duration_seconds(duration, self.bpm)
            .expect("duration and bpm are range-checked at parse time")
    }
}

fn undefined_pattern_message(
    name: &str,
    patterns: &std::collections::HashMap<&str, &Pattern>,
) -> String {
    if patterns.is_empty() {
        format!("Pattern '{name}' is undefined; no patterns are defined")
    } else {
        let mut names: Vec<&str> = patterns.keys().copied().collect();
        names.sort_unstable();
        format!(
            "Pattern '{name}' is undefined; defined patterns: {}",
            names.join(", ")
        )
    }
}

fn undefined_instrument_message(name: &str, instruments: &[Instrument]) -> String {
    if instruments.is_empty() {
        format!("Instrument '{name}' is undefined; no instruments are defined")
    } else {
        let names: Vec<&str> = instruments.iter().map(|i| i.name.as_str()).collect();
        format!(
            "Instrument '{name}' is undefined; defined instruments: {}",
            names.join(", ")
        )
    }
}

/// Compile a parsed [`Program`] into a sorted [`CompilationResult`].
///
/// Walks the top-level `seq:` block (if present) with the default
/// instrument (`program.instruments[0]`, synthesized by the parser if no
/// `inst` directive appeared), then each `track` with its referenced
/// instrument. All walks start at `t = 0`; swing is applied after the
/// merged list is sorted.
pub fn compile(program: &Program) -> Result<CompilationResult, CompileError> {
    let patterns: std::collections::HashMap<&str, &Pattern> = program
        .patterns
        .iter()
        .map(|p| (p.name.as_str(), p))
        .collect();

    let default_instrument = &program.instruments[0];

    let mut events = Vec::new();

    if let Some(sequence) = &program.sequence {
        let mut walker = Walker {
            bpm: program.bpm as f64,
            patterns: &patterns,
            expansion_stack: Vec::new(),
            events: Vec::new(),
        };
        let mut cursor = 0.0;
        walker.walk_items(sequence, default_instrument, None, &mut cursor)?;
        events.append(&mut walker.events);
    }

    for track in &program.tracks {
        let instrument = program
            .instruments
            .iter()
            .find(|i| i.name == track.instrument)
            .ok_or_else(|| {
                CompileError::reference(
                    track.instrument_line,
                    track.instrument_column,
                    undefined_instrument_message(&track.instrument, &program.instruments),
                )
            })?;
        let mut walker = Walker {
            bpm: program.bpm as f64,
            patterns: &patterns,
            expansion_stack: Vec::new(),
            events: Vec::new(),
        };
        let mut cursor = 0.0;
        walker.walk_items(&track.items, instrument, Some(&track.name), &mut cursor)?;
        events.append(&mut walker.events);
    }

    sort_events(&mut events);

    if program.settings.swing > 0.0 {
        events = apply_swing(&events, program.settings.swing, program.settings.grid, program.bpm as f64);
    }

    let total_duration = events
        .iter()
        .map(|e| e.t + e.dur)
        .fold(0.0_f64, f64::max);
    let event_count = events.len();

    log::debug!(
        "compiler: {event_count} event(s), total_duration={total_duration:.3}s, swing={}",
        program.settings.swing
    );

    Ok(CompilationResult {
        events,
        bpm: program.bpm,
        total_duration,
        event_count,
        settings: program.settings,
    })
}

/// Apply swing quantization to an already-sorted event list, returning a
/// freshly sorted copy. Exposed standalone per spec so a host/test suite can
/// exercise it directly on a hand-built event list.
///
/// `s = 60/bpm * (4/grid)` is the subdivision period. An event whose time
/// falls within `1e-3 * s` of an *odd* grid index `i = round(t/s)` is
/// delayed by `swing * s` (clamped to `>= 0`, which is a no-op for
/// non-negative inputs). `swing == 0` is the identity.
pub fn apply_swing(events: &[Event], swing: f64, grid: u16, bpm: f64) -> Vec<Event> {
    if swing <= 0.0 || bpm <= 0.0 || grid == 0 {
        return events.to_vec();
    }

    let s = 60.0 / bpm * (4.0 / grid as f64);
    let mut out: Vec<Event> = events
        .iter()
        .cloned()
        .map(|mut e| {
            let i = (e.t / s).round();
            if (e.t - i * s).abs() < 1e-3 * s && (i as i64).rem_euclid(2) == 1 {
                e.t = (e.t + swing * s).max(0.0);
            }
            e
        })
        .collect();
    sort_events(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile_str(src: &str) -> Result<CompilationResult, CompileError> {
        let tokens = Lexer::new(src).tokenize()?;
        let program = Parser::new(tokens).parse()?;
        compile(&program)
    }

    #[test]
    fn test_empty_source_compiles_to_no_events() {
        let result = compile_str("").unwrap();
        assert_eq!(result.bpm, 120);
        assert_eq!(result.event_count, 0);
        assert_eq!(result.total_duration, 0.0);
    }

    #[test]
    fn test_minimal_melody_two_notes() {
        let result = compile_str("bpm 120\nseq: C4 1/4, D4 1/4").unwrap();
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[0].t, 0.0);
        assert_eq!(result.events[0].midi, Some(60));
        assert!((result.events[0].freq.unwrap() - 261.6256).abs() < 1e-3);
        assert_eq!(result.events[0].velocity, DEFAULT_VELOCITY);
        assert_eq!(result.events[0].instrument_name, "lead");
        assert_eq!(result.events[1].t, 0.5);
        assert_eq!(result.events[1].midi, Some(62));
    }

    #[test]
    fn test_chord_does_not_widen_cursor() {
        let result = compile_str("bpm 120\nseq: [C4 E4 G4] 1/2, D4 1/4").unwrap();
        assert_eq!(result.events.len(), 4);
        for e in &result.events[0..3] {
            assert_eq!(e.t, 0.0);
            assert_eq!(e.dur, 1.0);
        }
        assert_eq!(result.events[3].t, 1.0);
        assert_eq!(result.events[3].dur, 0.5);
    }

    #[test]
    fn test_pattern_use_repetitions() {
        let result = compile_str(
            "bpm 120\npattern r: C4 1/4, D4 1/4\nseq: use r x2",
        )
        .unwrap();
        let times: Vec<f64> = result.events.iter().map(|e| e.t).collect();
        assert_eq!(times, vec![0.0, 0.5, 1.0, 1.5]);
        let midis: Vec<Option<i32>> = result.events.iter().map(|e| e.midi).collect();
        assert_eq!(midis, vec![Some(60), Some(62), Some(60), Some(62)]);
    }

    #[test]
    fn test_pattern_use_referentially_transparent() {
        let expanded = compile_str("bpm 120\nseq: C4 1/4, D4 1/4, C4 1/4, D4 1/4").unwrap();
        let via_pattern = compile_str("bpm 120\npattern p: C4 1/4, D4 1/4\nseq: use p x2").unwrap();
        let ts1: Vec<f64> = expanded.events.iter().map(|e| e.t).collect();
        let ts2: Vec<f64> = via_pattern.events.iter().map(|e| e.t).collect();
        assert_eq!(ts1, ts2);
        let m1: Vec<Option<i32>> = expanded.events.iter().map(|e| e.midi).collect();
        let m2: Vec<Option<i32>> = via_pattern.events.iter().map(|e| e.midi).collect();
        assert_eq!(m1, m2);
    }

    #[test]
    fn test_two_concurrent_tracks() {
        let result = compile_str(
            "bpm 120\ninst lead sine\ninst bass square\ntrack melody inst=lead: C4 1/4\ntrack bassline inst=bass: C2 1/4",
        )
        .unwrap();
        assert_eq!(result.events.len(), 2);
        assert!(result.events.iter().all(|e| e.t == 0.0));
        let mut tracks: Vec<&str> = result.events.iter().map(|e| e.track.as_deref().unwrap()).collect();
        tracks.sort_unstable();
        assert_eq!(tracks, vec!["bassline", "melody"]);
    }

    #[test]
    fn test_repeat_block_x2_equals_two_literal_copies() {
        let repeated = compile_str("bpm 120\nseq: x2 { C4 1/4 }").unwrap();
        let literal = compile_str("bpm 120\nseq: C4 1/4, C4 1/4").unwrap();
        let t1: Vec<f64> = repeated.events.iter().map(|e| e.t).collect();
        let t2: Vec<f64> = literal.events.iter().map(|e| e.t).collect();
        assert_eq!(t1, t2);
    }

    #[test]
    fn test_rest_has_no_midi_or_freq_and_zero_velocity() {
        let result = compile_str("bpm 120\nseq: r 1/4").unwrap();
        assert_eq!(result.events.len(), 1);
        let e = &result.events[0];
        assert_eq!(e.kind, EventKind::Rest);
        assert_eq!(e.midi, None);
        assert_eq!(e.freq, None);
        assert_eq!(e.velocity, 0.0);
    }

    #[test]
    fn test_undefined_instrument_reference_enumerates_names() {
        let err = compile_str("inst lead sine\ntrack melody inst=bogus: C4 1/4").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Reference);
        assert!(err.message.contains("lead"));
    }

    #[test]
    fn test_undefined_pattern_reference_enumerates_names() {
        let err = compile_str("pattern p: C4 1/4\nseq: use bogus").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Reference);
        assert!(err.message.contains('p'));
    }

    #[test]
    fn test_pattern_self_cycle_rejected() {
        let err = compile_str("pattern p: use p\nseq: use p").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Reference);
    }

    #[test]
    fn test_adsr_attached_only_when_declared() {
        let result = compile_str("inst lead sine attack=0.01\nseq: C4 1/4").unwrap();
        assert!(result.events[0].adsr.is_some());
        let result2 = compile_str("inst lead sine\nseq: C4 1/4").unwrap();
        assert!(result2.events[0].adsr.is_none());
    }

    #[test]
    fn test_swing_shifts_only_odd_grid_subdivisions() {
        let result = compile_str(
            "bpm 120\ngrid 16\nswing 0.5\nseq: C4 1/16, D4 1/16, E4 1/16, F4 1/16",
        )
        .unwrap();
        let times: Vec<f64> = result.events.iter().map(|e| (e.t * 1e4).round() / 1e4).collect();
        assert_eq!(times, vec![0.0, 0.1875, 0.25, 0.4375]);
    }

    #[test]
    fn test_swing_zero_is_identity() {
        let straight = compile_str("bpm 120\ngrid 16\nseq: C4 1/16, D4 1/16").unwrap();
        let swung = compile_str("bpm 120\ngrid 16\nswing 0.0\nseq: C4 1/16, D4 1/16").unwrap();
        let t1: Vec<f64> = straight.events.iter().map(|e| e.t).collect();
        let t2: Vec<f64> = swung.events.iter().map(|e| e.t).collect();
        assert_eq!(t1, t2);
    }
}
