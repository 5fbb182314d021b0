//! Play session: phase gating and the per-tick judgment pipeline.
//!
//! `SessionStateMachine` only decides which phase the session is in.
//! `PlaySession` owns every component (scheduler, adapter, engine, ledger)
//! and runs them in order on each tick while Playing.

use crate::config::{GameConfig, PlaySettings, RulesConfig};
use crate::judge::{DiagnosticRecord, JudgeSettings, JudgmentEngine, JudgmentMode, JudgmentOutcome};
use crate::motion::{MotionSignalAdapter, MotionSnapshot, SensorReading};
use crate::note::{Note, TargetGeometry};
use crate::scheduler::NoteScheduler;
use crate::score::{LastJudgment, ScoreLedger, ScoreRules, ScoreState, Tally};
use crate::telemetry::Telemetry;
use crate::types::{ChartEvent, JudgmentGrade, RawMotionEvent};
use serde::Serialize;

// ─── Phases ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SessionPhase {
    Idle,
    /// `hold_started_at` is set while the player is in position.
    Calibrating { hold_started_at: Option<f64> },
    Countdown { started_at: f64 },
    Playing { started_at: f64 },
    Finished { finished_at: f64 },
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "IDLE",
            SessionPhase::Calibrating { .. } => "CALIBRATING",
            SessionPhase::Countdown { .. } => "COUNTDOWN",
            SessionPhase::Playing { .. } => "PLAYING",
            SessionPhase::Finished { .. } => "FINISHED",
        }
    }
}

/// Operator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    /// Leave calibration without passing it, choosing the judgment mode.
    SkipCalibration { diagnostic: bool },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTiming {
    pub calibration_enabled: bool,
    pub calibration_hold_time: f64,
    pub countdown_secs: f64,
    pub finish_delay: f64,
}

impl SessionTiming {
    pub fn from_rules(rules: &RulesConfig) -> Self {
        Self {
            calibration_enabled: rules.calibration_enabled,
            calibration_hold_time: rules.calibration_hold_time,
            countdown_secs: rules.countdown_secs,
            finish_delay: rules.finish_delay,
        }
    }
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from_rules(&RulesConfig::default())
    }
}

pub struct SessionStateMachine {
    phase: SessionPhase,
    timing: SessionTiming,
    calibrated: bool,
    log: Telemetry,
}

impl SessionStateMachine {
    pub fn new(timing: SessionTiming, telemetry: &Telemetry) -> Self {
        Self {
            phase: SessionPhase::Idle,
            timing,
            calibrated: false,
            log: telemetry.scoped("beat_boxer::session"),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// True once calibration was passed rather than skipped.
    pub fn calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn timing(&self) -> &SessionTiming {
        &self.timing
    }

    /// Idle → Calibrating, or straight to Countdown when there is no sensor
    /// or calibration is disabled. Ignored outside Idle.
    pub fn start(&mut self, now: f64, calibration_available: bool) -> SessionPhase {
        if self.phase != SessionPhase::Idle {
            self.log.warn(format_args!("start ignored in phase {}", self.phase.name()));
            return self.phase;
        }
        if calibration_available && self.timing.calibration_enabled {
            self.transition(SessionPhase::Calibrating {
                hold_started_at: None,
            });
        } else {
            self.calibrated = false;
            self.transition(SessionPhase::Countdown { started_at: now });
        }
        self.phase
    }

    /// Returns true when calibration completed on this call.
    pub fn update_calibration(&mut self, now: f64, in_position: bool) -> bool {
        let SessionPhase::Calibrating { hold_started_at } = self.phase else {
            return false;
        };
        if !in_position {
            if hold_started_at.is_some() {
                self.log.debug(format_args!("calibration hold broken"));
            }
            self.phase = SessionPhase::Calibrating {
                hold_started_at: None,
            };
            return false;
        }
        let since = hold_started_at.unwrap_or(now);
        if now - since >= self.timing.calibration_hold_time {
            self.calibrated = true;
            self.transition(SessionPhase::Countdown { started_at: now });
            return true;
        }
        self.phase = SessionPhase::Calibrating {
            hold_started_at: Some(since),
        };
        false
    }

    /// Operator override: skip calibration. Valid from Idle or Calibrating.
    pub fn force_skip(&mut self, now: f64) -> bool {
        match self.phase {
            SessionPhase::Idle | SessionPhase::Calibrating { .. } => {
                self.calibrated = false;
                self.transition(SessionPhase::Countdown { started_at: now });
                true
            }
            _ => false,
        }
    }

    /// Returns true when play started on this call.
    pub fn update_countdown(&mut self, now: f64) -> bool {
        let SessionPhase::Countdown { started_at } = self.phase else {
            return false;
        };
        if now - started_at >= self.timing.countdown_secs {
            self.transition(SessionPhase::Playing { started_at: now });
            return true;
        }
        false
    }

    pub fn finish(&mut self, now: f64) -> bool {
        if !matches!(self.phase, SessionPhase::Playing { .. }) {
            return false;
        }
        self.transition(SessionPhase::Finished { finished_at: now });
        true
    }

    /// Finish from any phase, e.g. when there is nothing to play.
    pub fn conclude(&mut self, now: f64) {
        if !matches!(self.phase, SessionPhase::Finished { .. }) {
            self.transition(SessionPhase::Finished { finished_at: now });
        }
    }

    pub fn results_due(&self, now: f64) -> bool {
        match self.phase {
            SessionPhase::Finished { finished_at } => now - finished_at >= self.timing.finish_delay,
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.calibrated = false;
        if self.phase != SessionPhase::Idle {
            self.transition(SessionPhase::Idle);
        }
    }

    /// Start of the song on the driver clock, while Playing.
    pub fn session_start(&self) -> Option<f64> {
        match self.phase {
            SessionPhase::Playing { started_at } => Some(started_at),
            _ => None,
        }
    }

    pub fn countdown_remaining(&self, now: f64) -> Option<f64> {
        match self.phase {
            SessionPhase::Countdown { started_at } => {
                Some((self.timing.countdown_secs - (now - started_at)).max(0.0))
            }
            _ => None,
        }
    }

    /// Hold progress in [0, 1] while Calibrating.
    pub fn calibration_progress(&self, now: f64) -> Option<f64> {
        match self.phase {
            SessionPhase::Calibrating { hold_started_at } => {
                let held = hold_started_at.map_or(0.0, |since| now - since);
                if self.timing.calibration_hold_time <= 0.0 {
                    return Some(1.0);
                }
                Some((held / self.timing.calibration_hold_time).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }

    fn transition(&mut self, next: SessionPhase) {
        self.log.info(format_args!("{} -> {}", self.phase.name(), next.name()));
        self.phase = next;
    }
}

// ─── Tick report ────────────────────────────────────────────────────────────

/// What one tick produced, fanned out to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub timestamp: f64,
    pub phase: SessionPhase,
    pub outcomes: Vec<JudgmentOutcome>,
    pub score: i64,
    pub combo: u32,
    pub max_combo: u32,
    pub tally: Tally,
    pub last_judgment: Option<LastJudgment>,
    pub live_notes: Vec<Note>,
    /// Notes resolved this tick, for the renderer's fade-out.
    pub retired: Vec<Note>,
    pub countdown_remaining: Option<f64>,
    pub calibration_progress: Option<f64>,
    pub results_due: bool,
    /// Matching decisions recorded this tick (Diagnostic mode only).
    pub diagnostics: Vec<DiagnosticRecord>,
}

// ─── Play session ───────────────────────────────────────────────────────────

pub struct PlaySession {
    machine: SessionStateMachine,
    scheduler: NoteScheduler,
    adapter: MotionSignalAdapter,
    engine: JudgmentEngine,
    ledger: ScoreLedger,
    pending_events: Vec<RawMotionEvent>,
    default_mode: JudgmentMode,
    sensor_seen: bool,
    log: Telemetry,
}

impl PlaySession {
    pub fn new(
        config: &GameConfig,
        settings: PlaySettings,
        chart: Vec<ChartEvent>,
        mode: JudgmentMode,
        telemetry: &Telemetry,
    ) -> Self {
        let rules = &config.rules;
        Self {
            machine: SessionStateMachine::new(SessionTiming::from_rules(rules), telemetry),
            scheduler: NoteScheduler::new(chart, settings.lead_time, telemetry),
            adapter: MotionSignalAdapter::new(rules.action_thresholds, telemetry),
            engine: JudgmentEngine::new(
                JudgeSettings::from_rules(settings.thresholds, rules),
                mode,
                telemetry,
            ),
            ledger: ScoreLedger::new(ScoreRules::from_rules(rules, settings.score_multiplier), telemetry),
            pending_events: Vec::new(),
            default_mode: mode,
            sensor_seen: false,
            log: telemetry.scoped("beat_boxer::session"),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    pub fn machine(&self) -> &SessionStateMachine {
        &self.machine
    }

    pub fn score(&self) -> &ScoreState {
        self.ledger.state()
    }

    pub fn live_notes(&self) -> &[Note] {
        self.scheduler.live_notes()
    }

    pub fn pending_events(&self) -> &[RawMotionEvent] {
        &self.pending_events
    }

    pub fn mode(&self) -> JudgmentMode {
        self.engine.mode()
    }

    pub fn results_due(&self, now: f64) -> bool {
        self.machine.results_due(now)
    }

    /// Record whether the sensor is delivering before the next `adapt`, so a
    /// `Start` queued behind a reading sees it.
    pub fn note_sensor(&mut self, available: bool) {
        self.sensor_seen = available;
    }

    /// Turn a sensor reading (or its absence) into this tick's snapshot.
    pub fn adapt(
        &mut self,
        now: f64,
        reading: Option<&SensorReading>,
        geometry: &TargetGeometry,
    ) -> MotionSnapshot {
        let snapshot = match reading {
            Some(r) => self.adapter.adapt(r, geometry),
            None => MotionSnapshot::empty(now),
        };
        self.sensor_seen = snapshot.sensor_available;
        snapshot
    }

    pub fn command(&mut self, cmd: SessionCommand, now: f64) {
        self.log.info(format_args!("command {:?} at {:.3}", cmd, now));
        match cmd {
            SessionCommand::Start => {
                if self.machine.phase() != SessionPhase::Idle {
                    self.machine.start(now, self.sensor_seen);
                    return;
                }
                self.engine.set_mode(self.default_mode);
                if self.finish_if_empty(now) {
                    return;
                }
                self.machine.start(now, self.sensor_seen);
            }
            SessionCommand::SkipCalibration { diagnostic } => {
                let phase = self.machine.phase();
                if !matches!(phase, SessionPhase::Idle | SessionPhase::Calibrating { .. }) {
                    self.log.warn(format_args!("skip ignored in phase {}", phase.name()));
                    return;
                }
                let mode = if diagnostic {
                    JudgmentMode::Diagnostic
                } else {
                    JudgmentMode::Normal
                };
                self.engine.set_mode(mode);
                if self.finish_if_empty(now) {
                    return;
                }
                self.machine.force_skip(now);
            }
            SessionCommand::Reset => self.reset(),
        }
    }

    /// Clear every piece of session state and return to Idle.
    pub fn reset(&mut self) {
        self.machine.reset();
        self.scheduler.reset();
        self.adapter.reset();
        self.ledger.reset();
        self.engine.clear_diagnostics();
        self.engine.set_mode(self.default_mode);
        self.pending_events.clear();
    }

    pub fn tick(&mut self, now: f64, snapshot: MotionSnapshot, geometry: &TargetGeometry) -> TickReport {
        let mut outcomes = Vec::new();
        let mut retired = Vec::new();

        match self.machine.phase() {
            SessionPhase::Idle | SessionPhase::Finished { .. } => {}
            SessionPhase::Calibrating { .. } => {
                self.machine.update_calibration(now, snapshot.in_position);
            }
            SessionPhase::Countdown { .. } => {
                self.machine.update_countdown(now);
            }
            SessionPhase::Playing { started_at } => {
                outcomes = self.play(now, started_at, snapshot, geometry);
                retired = self.scheduler.retire_resolved();
                if self.scheduler.is_exhausted() {
                    self.machine.finish(now);
                    self.log_summary();
                }
            }
        }

        let score = self.ledger.state();
        TickReport {
            timestamp: now,
            phase: self.machine.phase(),
            outcomes,
            score: score.score,
            combo: score.combo,
            max_combo: score.max_combo,
            tally: score.tally,
            last_judgment: score.last_judgment,
            live_notes: self.scheduler.live_notes().to_vec(),
            retired,
            countdown_remaining: self.machine.countdown_remaining(now),
            calibration_progress: self.machine.calibration_progress(now),
            results_due: self.machine.results_due(now),
            diagnostics: self.engine.take_diagnostics(),
        }
    }

    fn play(
        &mut self,
        now: f64,
        started_at: f64,
        snapshot: MotionSnapshot,
        geometry: &TargetGeometry,
    ) -> Vec<JudgmentOutcome> {
        self.scheduler.advance(now, started_at, geometry);
        self.scheduler.update_positions(now, started_at, geometry.target_point());
        self.pending_events.extend(snapshot.events);

        let outcomes = self.engine.resolve_tick(
            now,
            started_at,
            &mut self.pending_events,
            self.scheduler.live_notes_mut(),
            &snapshot.probe,
        );
        for outcome in &outcomes {
            self.ledger.apply(outcome);
        }
        self.engine.expire_events(now, started_at, &mut self.pending_events);
        outcomes
    }

    fn finish_if_empty(&mut self, now: f64) -> bool {
        if !self.scheduler.chart().is_empty() {
            return false;
        }
        self.log.warn(format_args!("chart is empty, nothing to play"));
        self.machine.conclude(now);
        true
    }

    fn log_summary(&self) {
        let s = self.ledger.state();
        self.log.info(format_args!(
            "finished: score {} max combo {} (P{} Gr{} Go{} M{}, hazards {})",
            s.score,
            s.max_combo,
            s.tally.get(JudgmentGrade::Perfect),
            s.tally.get(JudgmentGrade::Great),
            s.tally.get(JudgmentGrade::Good),
            s.tally.get(JudgmentGrade::Miss),
            s.hazards_triggered
        ));
    }
}
