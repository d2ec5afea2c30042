//! End-to-end tests for the Cadence compiler and scheduler: source text in,
//! dispatched events out, with no internal knowledge of lexer/parser/compiler
//! internals beyond the public API.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use cadence::{compile_source, AudioBackend, ErrorKind, Event, Scheduler, SchedulerConfig};

static LOGGER: Once = Once::new();

/// Wires up `env_logger` once per test binary so the `trace!`/`debug!`/`warn!`
/// calls in the lexer/parser/compiler/scheduler are visible under
/// `RUST_LOG=cadence=trace cargo test -- --nocapture`.
fn enable_logging() {
    LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[test]
fn test_minimal_two_note_melody_compiles_in_order() {
    enable_logging();
    let result = compile_source("bpm 120\nseq: C4 1/4, D4 1/4").unwrap();
    assert_eq!(result.bpm, 120);
    assert_eq!(result.event_count, 2);
    assert_eq!(result.events[0].t, 0.0);
    assert_eq!(result.events[0].midi, Some(60));
    assert_eq!(result.events[1].t, 0.5);
    assert_eq!(result.events[1].midi, Some(62));
    assert!((result.total_duration - 1.0).abs() < 1e-9);
}

#[test]
fn test_chord_plus_pattern_plus_repeat_end_to_end() {
    let source = "bpm 120\n\
                  pattern riff: C4 1/8, D4 1/8\n\
                  seq: use riff x2, [C4 E4 G4] 1/2, x2 { E4 1/4 }";
    let result = compile_source(source).unwrap();
    // riff x2: 4 eighth notes spanning 1.0s, chord: 3 notes at t=1.0 sharing
    // one duration (advancing the cursor once), then 2 literal repeats of a
    // quarter note.
    let times: Vec<f64> = result.events.iter().map(|e| e.t).collect();
    assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 1.0, 2.0, 2.5]);
}

#[test]
fn test_two_tracks_with_mixed_instruments_and_swing() {
    let source = "bpm 120\ngrid 16\nswing 0.5\n\
                  inst lead sine\n\
                  inst bass square gain=0.5\n\
                  track melody inst=lead: C4 1/16, D4 1/16, E4 1/16, F4 1/16\n\
                  track bassline inst=bass: C2 1/4";
    let result = compile_source(source).unwrap();
    let melody_times: Vec<f64> = result
        .events
        .iter()
        .filter(|e| e.track.as_deref() == Some("melody"))
        .map(|e| (e.t * 1e4).round() / 1e4)
        .collect();
    assert_eq!(melody_times, vec![0.0, 0.1875, 0.25, 0.4375]);
    let bass_event = result
        .events
        .iter()
        .find(|e| e.track.as_deref() == Some("bassline"))
        .unwrap();
    assert_eq!(bass_event.gain, Some(0.5));
}

#[test]
fn test_undefined_instrument_reference_is_a_compile_error() {
    let err = compile_source("inst lead sine\ntrack melody inst=nope: C4 1/4").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Reference);
    assert!(err.message.contains("lead"));
}

#[test]
fn test_syntax_error_reports_position() {
    let err = compile_source("bpm 120\nseq: [C4 E4 1/2").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Syntactic);
    assert_eq!(err.line, 2);
}

#[test]
fn test_rest_and_velocity_suffix_round_trip() {
    let result = compile_source("seq: C4 1/4 vel=0.2, r 1/4, D4 1/4").unwrap();
    assert_eq!(result.events[0].velocity, 0.2);
    assert_eq!(result.events[1].velocity, 0.0);
    assert!(result.events[1].midi.is_none());
    assert_eq!(result.events[2].velocity, cadence::DEFAULT_VELOCITY);
}

/// A deterministic stand-in for a real-time audio backend: a test-driven
/// clock plus a log of everything the scheduler dispatched.
struct FakeBackend {
    clock: Rc<RefCell<f64>>,
    dispatched: Vec<(i32, f64)>,
}

impl AudioBackend for FakeBackend {
    fn audio_clock(&self) -> f64 {
        *self.clock.borrow()
    }
    fn resume_audio(&mut self) {}
    fn note_sink(&mut self, event: &Event, when: f64) {
        self.dispatched.push((event.midi.unwrap_or(-1), when));
    }
    fn cancel_all(&mut self) {}
}

#[test]
fn test_compile_then_schedule_dispatches_events_in_time_order() {
    enable_logging();
    let result = compile_source("bpm 120\nseq: C4 1/4, D4 1/4, E4 1/4").unwrap();
    let clock = Rc::new(RefCell::new(0.0));
    let config = SchedulerConfig::from_compilation(&result, false);
    let mut scheduler = Scheduler::new(
        config,
        FakeBackend {
            clock: clock.clone(),
            dispatched: Vec::new(),
        },
    );

    scheduler.play();
    scheduler.tick();
    *clock.borrow_mut() = 0.5;
    scheduler.tick();
    *clock.borrow_mut() = 1.0;
    scheduler.tick();

    // Playback runs to completion across a few ticks without duplicate or
    // out-of-order dispatches.
    let snapshot = scheduler.transport_state();
    assert_eq!(snapshot.next_index, 3);
}

#[test]
fn test_muted_track_is_silent_soloed_track_is_not() {
    let result =
        compile_source("track drums inst=lead: C4 1/4\ntrack bass inst=lead: C2 1/4").unwrap();
    let clock = Rc::new(RefCell::new(0.0));
    let config = SchedulerConfig::from_compilation(&result, false);
    let mut scheduler = Scheduler::new(
        config,
        FakeBackend {
            clock: clock.clone(),
            dispatched: Vec::new(),
        },
    );
    scheduler.set_track_muted("drums", true);
    scheduler.play();
    scheduler.tick();
    assert!(scheduler.is_track_muted("drums"));
    assert!(!scheduler.is_track_soloed("drums"));
}
