//! # Scheduler
//!
//! Drives playback of a compiled event list through a lookahead tick loop.
//! The tick is *externally* driven — nothing in this module spawns a thread
//! or owns a timer — matching the cooperative, single-mutator model: a host
//! calls [`Scheduler::tick`] roughly every [`LOOKAHEAD_MS`] while holding the
//! only reference to the scheduler.
//!
//! A host supplies an [`AudioBackend`] implementation bridging to its own
//! oscillator/envelope graph; this crate never touches an audio device.

use std::collections::HashSet;

use crate::compiler::{CompilationResult, Event, EventKind};

/// How far ahead of `audio_clock()` the scheduler dispatches events.
pub const SCHEDULE_AHEAD_SEC: f64 = 0.2;

/// The external driver's intended tick period. Not enforced by this module —
/// a host is free to call [`Scheduler::tick`] at whatever cadence it likes,
/// but [`SCHEDULE_AHEAD_SEC`] assumes something close to this.
pub const LOOKAHEAD_MS: u64 = 25;

/// Track name used for events that carry no explicit `track` field.
pub const DEFAULT_TRACK: &str = "default";

/// Host-provided bridge to the real-time audio backend.
///
/// `audio_clock` is read-only and may be called freely; the other three
/// methods mutate backend state and are only ever called from [`Scheduler`]
/// methods, which the host must serialize onto a single executor (see
/// crate-level concurrency notes).
pub trait AudioBackend {
    /// Monotonic seconds since an arbitrary epoch.
    fn audio_clock(&self) -> f64;
    /// Ensure the tone generator accepts scheduled work. Called once by
    /// [`Scheduler::play`] before the transport starts.
    fn resume_audio(&mut self);
    /// Dispatch a note event at `when` seconds on the audio clock. Never
    /// called for `EventKind::Rest`.
    fn note_sink(&mut self, event: &Event, when: f64);
    /// Silence and discard all pending dispatches.
    fn cancel_all(&mut self);
}

/// Static configuration a [`Scheduler`] is built from: the compiled events
/// plus the tempo/loop settings they imply.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub events: Vec<Event>,
    pub bpm: u32,
    pub loop_bars: u32,
    pub loop_enabled: bool,
}

impl SchedulerConfig {
    /// Build a config from a [`CompilationResult`], looping disabled by
    /// default (a host turns it on via [`Scheduler::set_loop_enabled`]).
    pub fn from_compilation(result: &CompilationResult, loop_enabled: bool) -> Self {
        SchedulerConfig {
            events: result.events.clone(),
            bpm: result.bpm,
            loop_bars: result.settings.loop_bars,
            loop_enabled,
        }
    }

    fn loop_duration_sec(&self) -> f64 {
        if self.loop_bars == 0 || self.bpm == 0 {
            log::warn!(
                "scheduler: degenerate loop config (loop_bars={}, bpm={}), collapsing to non-looping",
                self.loop_bars,
                self.bpm
            );
            0.0
        } else {
            self.loop_bars as f64 * 4.0 * 60.0 / self.bpm as f64
        }
    }
}

/// Mutable transport state. Private to [`Scheduler`]; a host only ever sees
/// an immutable [`TransportSnapshot`] of it.
struct TransportState {
    loop_enabled: bool,
    loop_duration_sec: f64,
    playing: bool,
    start_time: f64,
    next_index: usize,
    scheduled_in_current_loop: HashSet<usize>,
    current_loop_iteration: u64,
    muted_tracks: HashSet<String>,
    soloed_tracks: HashSet<String>,
}

/// Point-in-time, read-only view of the transport, handed to a registered
/// state listener.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportSnapshot {
    pub playing: bool,
    pub loop_enabled: bool,
    pub loop_duration_sec: f64,
    pub bpm: u32,
    pub loop_bars: u32,
    pub current_loop_iteration: u64,
    pub next_index: usize,
}

/// Drives an [`AudioBackend`] from a compiled event list.
pub struct Scheduler<B: AudioBackend> {
    events: Vec<Event>,
    bpm: u32,
    loop_bars: u32,
    transport: TransportState,
    backend: B,
    state_listener: Option<Box<dyn FnMut(&TransportSnapshot)>>,
    playhead_listener: Option<Box<dyn FnMut(f64)>>,
}

impl<B: AudioBackend> Scheduler<B> {
    pub fn new(config: SchedulerConfig, backend: B) -> Self {
        let loop_duration_sec = config.loop_duration_sec();
        Scheduler {
            events: config.events,
            bpm: config.bpm,
            loop_bars: config.loop_bars,
            transport: TransportState {
                loop_enabled: config.loop_enabled,
                loop_duration_sec,
                playing: false,
                start_time: 0.0,
                next_index: 0,
                scheduled_in_current_loop: HashSet::new(),
                current_loop_iteration: 0,
                muted_tracks: HashSet::new(),
                soloed_tracks: HashSet::new(),
            },
            backend,
            state_listener: None,
            playhead_listener: None,
        }
    }

    /// Register a callback invoked with a [`TransportSnapshot`] whenever
    /// `play`, `stop`, or `set_loop_enabled` runs.
    pub fn set_state_listener(&mut self, listener: impl FnMut(&TransportSnapshot) + 'static) {
        self.state_listener = Some(Box::new(listener));
    }

    /// Register a callback invoked with the playhead position on every tick.
    pub fn set_playhead_listener(&mut self, listener: impl FnMut(f64) + 'static) {
        self.playhead_listener = Some(Box::new(listener));
    }

    fn loop_active(&self) -> bool {
        self.transport.loop_enabled && self.transport.loop_duration_sec > 0.0
    }

    fn notify_state(&mut self) {
        if let Some(listener) = &mut self.state_listener {
            let snapshot = TransportSnapshot {
                playing: self.transport.playing,
                loop_enabled: self.transport.loop_enabled,
                loop_duration_sec: self.transport.loop_duration_sec,
                bpm: self.bpm,
                loop_bars: self.loop_bars,
                current_loop_iteration: self.transport.current_loop_iteration,
                next_index: self.transport.next_index,
            };
            listener(&snapshot);
        }
    }

    /// Resume audio, reset the cursor, and start the transport. No-op if
    /// already playing.
    pub fn play(&mut self) {
        if self.transport.playing {
            return;
        }
        self.backend.resume_audio();
        self.transport.start_time = self.backend.audio_clock();
        self.transport.playing = true;
        self.transport.next_index = 0;
        self.transport.current_loop_iteration = 0;
        self.transport.scheduled_in_current_loop.clear();
        self.notify_state();
    }

    /// Silence all pending dispatches and stop the transport.
    pub fn stop(&mut self) {
        self.backend.cancel_all();
        self.transport.next_index = 0;
        self.transport.current_loop_iteration = 0;
        self.transport.scheduled_in_current_loop.clear();
        self.transport.playing = false;
        self.notify_state();
    }

    /// `stop()` followed by `play()`.
    pub fn restart(&mut self) {
        self.stop();
        self.play();
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.transport.loop_enabled = enabled;
        self.notify_state();
    }

    pub fn set_track_muted(&mut self, track: &str, muted: bool) {
        if muted {
            self.transport.muted_tracks.insert(track.to_string());
        } else {
            self.transport.muted_tracks.remove(track);
        }
    }

    pub fn set_track_soloed(&mut self, track: &str, soloed: bool) {
        if soloed {
            self.transport.soloed_tracks.insert(track.to_string());
        } else {
            self.transport.soloed_tracks.remove(track);
        }
    }

    pub fn is_track_muted(&self, track: &str) -> bool {
        self.transport.muted_tracks.contains(track)
    }

    pub fn is_track_soloed(&self, track: &str) -> bool {
        self.transport.soloed_tracks.contains(track)
    }

    /// Current playhead position in seconds: elapsed time since `play()`,
    /// wrapped into `[0, loop_duration_sec)` while looping. `0.0` when not
    /// playing.
    pub fn playhead_position(&self) -> f64 {
        if !self.transport.playing {
            return 0.0;
        }
        let elapsed = self.backend.audio_clock() - self.transport.start_time;
        if self.loop_active() {
            elapsed.rem_euclid(self.transport.loop_duration_sec)
        } else {
            elapsed
        }
    }

    pub fn transport_state(&self) -> TransportSnapshot {
        TransportSnapshot {
            playing: self.transport.playing,
            loop_enabled: self.transport.loop_enabled,
            loop_duration_sec: self.transport.loop_duration_sec,
            bpm: self.bpm,
            loop_bars: self.loop_bars,
            current_loop_iteration: self.transport.current_loop_iteration,
            next_index: self.transport.next_index,
        }
    }

    /// Solo overrides mute: if any track is soloed, only soloed tracks are
    /// accepted regardless of the mute set.
    fn track_filter(&self, event: &Event) -> bool {
        let track = event.track.as_deref().unwrap_or(DEFAULT_TRACK);
        if !self.transport.soloed_tracks.is_empty() {
            self.transport.soloed_tracks.contains(track)
        } else {
            !self.transport.muted_tracks.contains(track)
        }
    }

    fn dispatch_if_accepted(&mut self, index: usize, when: f64) -> bool {
        let event = &self.events[index];
        if event.kind == EventKind::Note && self.track_filter(event) {
            let event = self.events[index].clone();
            log::trace!("scheduler: dispatch index={index} when={when:.3}");
            self.backend.note_sink(&event, when);
            true
        } else {
            false
        }
    }

    /// Advance the transport by one external timer tick. A no-op unless
    /// currently playing.
    pub fn tick(&mut self) {
        if !self.transport.playing {
            return;
        }
        let now = self.backend.audio_clock();
        let elapsed = now - self.transport.start_time;
        let playhead = if self.loop_active() {
            elapsed.rem_euclid(self.transport.loop_duration_sec)
        } else {
            elapsed
        };
        if let Some(listener) = &mut self.playhead_listener {
            listener(playhead);
        }

        if self.loop_active() {
            self.tick_looping(now, elapsed);
        } else {
            self.tick_non_looping(now);
        }
    }

    fn tick_non_looping(&mut self, now: f64) {
        let ahead = now + SCHEDULE_AHEAD_SEC;
        let start_time = self.transport.start_time;
        while self.transport.next_index < self.events.len() {
            let i = self.transport.next_index;
            let when = start_time + self.events[i].t;
            if when >= ahead {
                break;
            }
            if when >= now {
                self.dispatch_if_accepted(i, when);
            }
            self.transport.next_index += 1;
        }

        if self.transport.next_index >= self.events.len() {
            let end_time = match self.events.last() {
                Some(last) => start_time + last.t + last.dur,
                None => start_time,
            };
            if now > end_time {
                self.stop();
            }
        }
    }

    fn tick_looping(&mut self, now: f64, elapsed: f64) {
        let loop_dur = self.transport.loop_duration_sec;
        let new_iteration = (elapsed / loop_dur).floor() as u64;
        if new_iteration > self.transport.current_loop_iteration {
            self.transport.current_loop_iteration = new_iteration;
            self.transport.next_index = 0;
            self.transport.scheduled_in_current_loop.clear();
        }

        let loop_origin =
            self.transport.start_time + self.transport.current_loop_iteration as f64 * loop_dur;
        let ahead = now + SCHEDULE_AHEAD_SEC;

        while self.transport.next_index < self.events.len() {
            let i = self.transport.next_index;
            if self.events[i].t >= loop_dur {
                // Sorted ascending: everything from here on is also out of
                // this loop window, so there is nothing left to walk.
                break;
            }
            let when = loop_origin + self.events[i].t;
            if when >= ahead {
                break;
            }
            if when >= now && !self.transport.scheduled_in_current_loop.contains(&i) {
                if self.dispatch_if_accepted(i, when) {
                    self.transport.scheduled_in_current_loop.insert(i);
                }
            }
            self.transport.next_index += 1;
        }

        let pos_in_loop = elapsed.rem_euclid(loop_dur);
        if pos_in_loop + SCHEDULE_AHEAD_SEC >= loop_dur {
            let next_origin = loop_origin + loop_dur;
            for i in 0..self.events.len() {
                if self.events[i].t >= loop_dur {
                    break;
                }
                let when = next_origin + self.events[i].t;
                if when >= now && when < ahead {
                    // Intentionally not recorded in scheduled_in_current_loop
                    // (that set is keyed by the current iteration only); a
                    // tick gap spanning a loop wrap could in principle
                    // redispatch this event once more on the next iteration's
                    // primary pass. Preserved per spec as observed behavior.
                    self.dispatch_if_accepted(i, when);
                }
            }
        }
    }
}
