//! Judgment engine: matches motion events to live notes and grades them.
//!
//! One `resolve_tick` call per driver tick. In order:
//! 1. hazard check for strike events
//! 2. event matching under the timing windows, with a deterministic tie-break
//! 3. probe-driven judgment for weave notes
//! 4. timeout sweep for strike notes and hazards
//!
//! The engine never fails. Events that match nothing are simply left
//! unconsumed and expire later through `expire_events`.

use crate::config::RulesConfig;
use crate::motion::SpatialProbe;
use crate::note::{Note, Resolution};
use crate::telemetry::Telemetry;
use crate::types::{JudgmentGrade, NoteKind, Point2, RawMotionEvent, SenseMode};
use serde::{Deserialize, Serialize};

// ─── Thresholds ─────────────────────────────────────────────────────────────

/// Grade windows in seconds, `perfect <= great <= good`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeThresholds {
    pub perfect: f64,
    pub great: f64,
    pub good: f64,
}

impl JudgeThresholds {
    pub const fn new(perfect: f64, great: f64, good: f64) -> Self {
        Self {
            perfect,
            great,
            good,
        }
    }

    pub fn scaled(&self, scale: f64) -> Self {
        Self::new(self.perfect * scale, self.great * scale, self.good * scale)
    }

    pub fn is_valid(&self) -> bool {
        let all_positive = [self.perfect, self.great, self.good]
            .iter()
            .all(|w| w.is_finite() && *w > 0.0);
        all_positive && self.perfect <= self.great && self.great <= self.good
    }

    pub fn widest(&self) -> f64 {
        self.perfect.max(self.great).max(self.good)
    }

    /// First grade whose window contains `delta`, best first.
    pub fn grade(&self, delta: f64) -> Option<JudgmentGrade> {
        let delta = delta.abs();
        if delta <= self.perfect {
            Some(JudgmentGrade::Perfect)
        } else if delta <= self.great {
            Some(JudgmentGrade::Great)
        } else if delta <= self.good {
            Some(JudgmentGrade::Good)
        } else {
            None
        }
    }
}

impl Default for JudgeThresholds {
    fn default() -> Self {
        Self::new(0.25, 0.4, 0.6)
    }
}

/// Everything that shapes a judgment, fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JudgeSettings {
    pub thresholds: JudgeThresholds,
    /// Added to event times before matching (s).
    pub timing_offset: f64,
    pub match_slack: f64,
    pub miss_multiplier: f64,
    pub weave_window: f64,
}

impl JudgeSettings {
    pub fn from_rules(thresholds: JudgeThresholds, rules: &RulesConfig) -> Self {
        Self {
            thresholds,
            timing_offset: rules.timing_offset,
            match_slack: rules.match_slack,
            miss_multiplier: rules.miss_multiplier,
            weave_window: rules.weave_window,
        }
    }

    /// Candidate window for event matching.
    pub fn match_window(&self) -> f64 {
        self.thresholds.widest() + self.match_slack
    }

    /// How long past its time a strike note waits before it is missed.
    pub fn miss_window(&self) -> f64 {
        self.thresholds.good * self.miss_multiplier
    }
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self::from_rules(JudgeThresholds::default(), &RulesConfig::default())
    }
}

// ─── Outcomes ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MissCause {
    /// A strike note was never hit.
    Timeout,
    /// The body never entered a weave note's region.
    OutOfRegion,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum JudgmentOutcome {
    Hit {
        note_id: u64,
        note_kind: NoteKind,
        grade: JudgmentGrade,
        delta: f64,
        timestamp: f64,
        position: Point2,
    },
    Miss {
        note_id: u64,
        note_kind: NoteKind,
        cause: MissCause,
        timestamp: f64,
        position: Point2,
    },
    /// A hazard was struck.
    Penalty {
        note_id: u64,
        note_kind: NoteKind,
        timestamp: f64,
        position: Point2,
    },
}

impl JudgmentOutcome {
    pub fn note_id(&self) -> u64 {
        match *self {
            JudgmentOutcome::Hit { note_id, .. }
            | JudgmentOutcome::Miss { note_id, .. }
            | JudgmentOutcome::Penalty { note_id, .. } => note_id,
        }
    }

    pub fn note_kind(&self) -> NoteKind {
        match *self {
            JudgmentOutcome::Hit { note_kind, .. }
            | JudgmentOutcome::Miss { note_kind, .. }
            | JudgmentOutcome::Penalty { note_kind, .. } => note_kind,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match *self {
            JudgmentOutcome::Hit { timestamp, .. }
            | JudgmentOutcome::Miss { timestamp, .. }
            | JudgmentOutcome::Penalty { timestamp, .. } => timestamp,
        }
    }

    /// Grade for hits and misses; penalties carry none.
    pub fn grade(&self) -> Option<JudgmentGrade> {
        match *self {
            JudgmentOutcome::Hit { grade, .. } => Some(grade),
            JudgmentOutcome::Miss { .. } => Some(JudgmentGrade::Miss),
            JudgmentOutcome::Penalty { .. } => None,
        }
    }
}

// ─── Diagnostics ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JudgmentMode {
    Normal,
    /// Records every matching decision; results are unchanged.
    Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum DiagnosticReason {
    Matched(JudgmentGrade),
    HazardTriggered,
    /// No pending note of the event's kind.
    NoCandidate,
    /// Nearest note lies outside the match window.
    OutsideWindow,
    /// Inside the match window but beyond every grade.
    Ungraded,
}

/// One event's matching decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiagnosticRecord {
    pub event_kind: NoteKind,
    pub adjusted_time: f64,
    /// Signed `adjusted - scheduled` to the nearest pending note of that kind.
    pub nearest_delta: Option<f64>,
    pub reason: DiagnosticReason,
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub struct JudgmentEngine {
    settings: JudgeSettings,
    mode: JudgmentMode,
    diagnostics: Vec<DiagnosticRecord>,
    log: Telemetry,
}

impl JudgmentEngine {
    pub fn new(settings: JudgeSettings, mode: JudgmentMode, telemetry: &Telemetry) -> Self {
        Self {
            settings,
            mode,
            diagnostics: Vec::new(),
            log: telemetry.scoped("beat_boxer::judge"),
        }
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    pub fn mode(&self) -> JudgmentMode {
        self.mode
    }

    /// Only called between sessions; the mode never changes mid-play.
    pub fn set_mode(&mut self, mode: JudgmentMode) {
        self.mode = mode;
    }

    pub fn take_diagnostics(&mut self) -> Vec<DiagnosticRecord> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn clear_diagnostics(&mut self) {
        self.diagnostics.clear();
    }

    /// Judge one tick. Writes note resolutions and event `consumed` flags in
    /// place and returns the outcomes in the order they were decided.
    pub fn resolve_tick(
        &mut self,
        now: f64,
        session_start: f64,
        raw_events: &mut [RawMotionEvent],
        live_notes: &mut [Note],
        probe: &SpatialProbe,
    ) -> Vec<JudgmentOutcome> {
        let mut outcomes = Vec::new();
        for event in raw_events.iter_mut().filter(|e| !e.consumed) {
            if let Some(outcome) = self.match_event(now, session_start, event, live_notes) {
                outcomes.push(outcome);
            }
        }
        self.judge_weaves(now, session_start, live_notes, probe, &mut outcomes);
        self.sweep(now, session_start, live_notes, &mut outcomes);
        outcomes
    }

    fn match_event(
        &mut self,
        now: f64,
        session_start: f64,
        event: &mut RawMotionEvent,
        notes: &mut [Note],
    ) -> Option<JudgmentOutcome> {
        let adjusted = (event.event_time - session_start) + self.settings.timing_offset;
        let thresholds = self.settings.thresholds;

        if event.kind.sense_mode() == SenseMode::Strike {
            let hazard = nearest_pending(notes, adjusted, thresholds.good, |n| {
                n.kind.sense_mode() == SenseMode::Hazard
            });
            if let Some(idx) = hazard {
                let note = &mut notes[idx];
                note.resolve(Resolution::Triggered);
                event.consumed = true;
                let delta = adjusted - note.scheduled_time;
                self.record(event.kind, adjusted, Some(delta), DiagnosticReason::HazardTriggered);
                self.log.debug(format_args!(
                    "{} struck hazard {} (due {:.3}, at {:.3})",
                    event.kind, note.id, note.scheduled_time, adjusted
                ));
                return Some(JudgmentOutcome::Penalty {
                    note_id: note.id,
                    note_kind: note.kind,
                    timestamp: now,
                    position: note.position,
                });
            }
        }

        let kind = event.kind;
        let Some(idx) = nearest_pending(notes, adjusted, self.settings.match_window(), |n| n.kind == kind)
        else {
            if self.mode == JudgmentMode::Diagnostic {
                let nearest = nearest_pending(notes, adjusted, f64::INFINITY, |n| n.kind == kind);
                let (delta, reason) = match nearest {
                    Some(i) => (Some(adjusted - notes[i].scheduled_time), DiagnosticReason::OutsideWindow),
                    None => (None, DiagnosticReason::NoCandidate),
                };
                self.record(kind, adjusted, delta, reason);
            }
            return None;
        };

        let note = &mut notes[idx];
        let signed = adjusted - note.scheduled_time;
        let delta = signed.abs();
        let Some(grade) = thresholds.grade(delta) else {
            self.record(kind, adjusted, Some(signed), DiagnosticReason::Ungraded);
            return None;
        };

        note.resolve(Resolution::Hit { grade, delta });
        event.consumed = true;
        self.record(kind, adjusted, Some(signed), DiagnosticReason::Matched(grade));
        self.log.debug(format_args!(
            "{} note {} -> {} (delta {:+.3}s)",
            kind, note.id, grade, signed
        ));
        Some(JudgmentOutcome::Hit {
            note_id: note.id,
            note_kind: note.kind,
            grade,
            delta,
            timestamp: now,
            position: note.position,
        })
    }

    /// Weave notes are judged by where the body is, not by events.
    fn judge_weaves(
        &mut self,
        now: f64,
        session_start: f64,
        notes: &mut [Note],
        probe: &SpatialProbe,
        outcomes: &mut Vec<JudgmentOutcome>,
    ) {
        let now_rel = now - session_start;
        let window = self.settings.weave_window;
        for note in notes.iter_mut() {
            if !note.is_pending() || note.kind.sense_mode() != SenseMode::Probe {
                continue;
            }
            let offset = now_rel - note.scheduled_time;
            if offset.abs() <= window && probe.is_active(note.kind) {
                let delta = offset.abs();
                let grade = self.settings.thresholds.grade(delta).unwrap_or(JudgmentGrade::Good);
                note.resolve(Resolution::Hit { grade, delta });
                self.log.debug(format_args!("{} note {} -> {} (in region)", note.kind, note.id, grade));
                outcomes.push(JudgmentOutcome::Hit {
                    note_id: note.id,
                    note_kind: note.kind,
                    grade,
                    delta,
                    timestamp: now,
                    position: note.position,
                });
            } else if offset > window {
                note.resolve(Resolution::Missed);
                self.log.debug(format_args!("{} note {} -> MISS (out of region)", note.kind, note.id));
                outcomes.push(JudgmentOutcome::Miss {
                    note_id: note.id,
                    note_kind: note.kind,
                    cause: MissCause::OutOfRegion,
                    timestamp: now,
                    position: note.position,
                });
            }
        }
    }

    /// Strike notes time out; hazards that were never struck are cleared.
    /// Weave notes are left to `judge_weaves`.
    fn sweep(
        &mut self,
        now: f64,
        session_start: f64,
        notes: &mut [Note],
        outcomes: &mut Vec<JudgmentOutcome>,
    ) {
        let now_rel = now - session_start;
        let deadline = self.settings.miss_window();
        for note in notes.iter_mut().filter(|n| n.is_pending()) {
            if now_rel <= note.scheduled_time + deadline {
                continue;
            }
            match note.kind.sense_mode() {
                SenseMode::Strike => {
                    note.resolve(Resolution::Missed);
                    self.log.debug(format_args!("{} note {} -> MISS (timeout)", note.kind, note.id));
                    outcomes.push(JudgmentOutcome::Miss {
                        note_id: note.id,
                        note_kind: note.kind,
                        cause: MissCause::Timeout,
                        timestamp: now,
                        position: note.position,
                    });
                }
                SenseMode::Hazard => {
                    note.resolve(Resolution::Cleared);
                }
                SenseMode::Probe => {}
            }
        }
    }

    /// Drop consumed events and events too old to match anything.
    pub fn expire_events(&self, now: f64, session_start: f64, events: &mut Vec<RawMotionEvent>) {
        let horizon = now - session_start - self.settings.match_window();
        let offset = self.settings.timing_offset;
        events.retain(|e| !e.consumed && (e.event_time - session_start) + offset >= horizon);
    }

    fn record(
        &mut self,
        event_kind: NoteKind,
        adjusted_time: f64,
        nearest_delta: Option<f64>,
        reason: DiagnosticReason,
    ) {
        if self.mode != JudgmentMode::Diagnostic {
            return;
        }
        let record = DiagnosticRecord {
            event_kind,
            adjusted_time,
            nearest_delta,
            reason,
        };
        self.log.debug(format_args!("diagnostic: {:?}", record));
        self.diagnostics.push(record);
    }
}

/// Index of the pending note closest to `time` within `window`, among notes
/// accepted by `filter`. Ties go to the earlier scheduled time, then lower id.
fn nearest_pending(notes: &[Note], time: f64, window: f64, filter: impl Fn(&Note) -> bool) -> Option<usize> {
    notes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_pending() && filter(n))
        .map(|(i, n)| (i, (n.scheduled_time - time).abs(), n))
        .filter(|(_, d, _)| *d <= window)
        .min_by(|(_, da, a), (_, db, b)| {
            da.total_cmp(db)
                .then_with(|| a.scheduled_time.total_cmp(&b.scheduled_time))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|(i, _, _)| i)
}
