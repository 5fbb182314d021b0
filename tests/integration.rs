//! End-to-end integration tests for the Beat Boxer pipeline.
//!
//! These tests exercise the full data flow:
//!   chart file → ChartLoader → PlaySession
//!   Simulator → InputEvent channel → Coordinator → TickReport channel → assertions
//!
//! Most tests drive `Coordinator::step` / `PlaySession::tick` with explicit
//! timestamps so they are deterministic. One test runs the real threads.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::fs;
use std::thread;

use beat_boxer::chart::{self, ChartError, ChartSource, GRID_FILE, ROWS_FILE};
use beat_boxer::config::{GameConfig, PlaySettings, SongInfo};
use beat_boxer::coordinator::Coordinator;
use beat_boxer::judge::{JudgeThresholds, JudgmentMode, JudgmentOutcome, MissCause};
use beat_boxer::motion::{MotionSnapshot, SensorReading};
use beat_boxer::note::{Resolution, TargetGeometry};
use beat_boxer::score::{ScoreLedger, ScoreRules};
use beat_boxer::session::{PlaySession, SessionCommand, SessionPhase, TickReport};
use beat_boxer::simulator::Simulator;
use beat_boxer::telemetry::Telemetry;
use beat_boxer::types::*;

// ─── Helpers ───────────────────────────────────────────────────────────────

const TICK: f64 = 1.0 / 60.0;

fn settings(perfect: f64, great: f64, good: f64) -> PlaySettings {
    PlaySettings {
        thresholds: JudgeThresholds::new(perfect, great, good),
        lead_time: 1.2,
        score_multiplier: 1.0,
    }
}

fn session(chart: Vec<ChartEvent>, settings: PlaySettings) -> PlaySession {
    PlaySession::new(&GameConfig::default(), settings, chart, JudgmentMode::Normal, &Telemetry::new("test"))
}

fn snapshot(now: f64, events: Vec<RawMotionEvent>) -> MotionSnapshot {
    let mut s = MotionSnapshot::empty(now);
    s.sensor_available = true;
    s.events = events;
    s
}

/// Skip calibration, run out the default 3 s countdown. Returns the song start.
fn begin(s: &mut PlaySession) -> f64 {
    let g = TargetGeometry::default();
    s.command(SessionCommand::SkipCalibration { diagnostic: false }, 0.0);
    s.tick(3.0, MotionSnapshot::empty(3.0), &g);
    assert_eq!(s.phase(), SessionPhase::Playing { started_at: 3.0 });
    3.0
}

/// A coordinator over the default config, fed by a bounded input channel.
fn pipeline(
    chart: Vec<ChartEvent>,
    mode: JudgmentMode,
) -> (Coordinator, Sender<InputEvent>, Receiver<TickReport>) {
    let cfg = GameConfig::default();
    let telemetry = Telemetry::new("integration");
    let session = PlaySession::new(&cfg, cfg.settings(None), chart, mode, &telemetry);
    let (input_tx, input_rx) = bounded::<InputEvent>(4096);
    let (report_tx, report_rx) = unbounded::<TickReport>();
    let coord = Coordinator::new(input_rx, vec![report_tx], session, cfg.layout.clone(), &telemetry);
    (coord, input_tx, report_rx)
}

/// Play a chart with the scripted player at 60 Hz (sensor and judgment in
/// lockstep), skipping calibration, until results are due. Returns every
/// outcome in order, the final report and the diagnostic record count.
fn play_scripted(
    chart: Vec<ChartEvent>,
    mode: JudgmentMode,
    timing_error: f64,
) -> (Vec<JudgmentOutcome>, TickReport, usize) {
    let command = SessionCommand::SkipCalibration {
        diagnostic: mode == JudgmentMode::Diagnostic,
    };
    let (outcomes, report, coord) = perform(chart, mode, timing_error, command);
    (outcomes, report, coord.diagnostic_count())
}

/// Like `play_scripted`, but opens with any command. The player's song clock
/// assumes a full calibration hold before the countdown unless the command
/// skips it. As in `main`, the first reading and the command share a drain.
fn perform(
    chart: Vec<ChartEvent>,
    mode: JudgmentMode,
    timing_error: f64,
    command: SessionCommand,
) -> (Vec<JudgmentOutcome>, TickReport, Coordinator) {
    let cfg = GameConfig::default();
    let play_offset = match command {
        SessionCommand::Start => cfg.rules.calibration_hold_time + cfg.rules.countdown_secs,
        _ => cfg.rules.countdown_secs,
    };
    let (mut coord, input_tx, _reports) = pipeline(chart.clone(), mode);
    let (sim_tx, _sim_rx) = bounded(1);
    let sim = Simulator::new(SessionClock::new(), sim_tx, chart, TargetGeometry::from_layout(&cfg.layout), 60)
        .with_play_offset(play_offset)
        .with_timing_error(timing_error);

    input_tx.send(InputEvent::Sensor(sim.reading_at(0.0))).unwrap();
    input_tx.send(InputEvent::Command(command)).unwrap();

    let mut outcomes = Vec::new();
    for i in 0..(60 * 30) {
        let t = i as f64 * TICK;
        if i > 0 {
            input_tx.send(InputEvent::Sensor(sim.reading_at(t))).unwrap();
        }
        let report = coord.step(t);
        outcomes.extend(report.outcomes.iter().copied());
        if report.results_due {
            return (outcomes, report, coord);
        }
    }
    panic!("session never reached results");
}

fn hit(grade: JudgmentGrade) -> JudgmentOutcome {
    JudgmentOutcome::Hit {
        note_id: 0,
        note_kind: NoteKind::JabLeft,
        grade,
        delta: 0.0,
        timestamp: 0.0,
        position: Point2::default(),
    }
}

fn miss() -> JudgmentOutcome {
    JudgmentOutcome::Miss {
        note_id: 0,
        note_kind: NoteKind::JabLeft,
        cause: MissCause::Timeout,
        timestamp: 0.0,
        position: Point2::default(),
    }
}

// ─── Chart loading ─────────────────────────────────────────────────────────

#[test]
fn test_grid_chart_from_song_directory() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(GRID_FILE), "1002\n").unwrap();
    fs::write(dir.path().join(ROWS_FILE), r#"[{"t": 9.0, "type": "BOMB"}]"#).unwrap();

    let song = SongInfo {
        bpm: 60.0,
        division: 4,
        start_delay: 0.0,
    };
    let events = chart::load(&ChartSource::from_path(dir.path(), song)).unwrap();
    // Grid wins over rows; '0' steps produce nothing.
    assert_eq!(
        events,
        vec![ChartEvent::new(0.0, NoteKind::JabLeft), ChartEvent::new(0.75, NoteKind::WeaveRight)]
    );
}

#[test]
fn test_grid_chart_at_120_bpm() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.txt");
    fs::write(&path, "# intro\n1002\n").unwrap();

    let events = chart::load(&ChartSource::from_path(&path, SongInfo::default())).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], ChartEvent::new(0.0, NoteKind::JabLeft));
    assert_eq!(events[1], ChartEvent::new(0.375, NoteKind::JabRight));
}

#[test]
fn test_row_chart_sorted_and_end_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("beatmap.json");
    fs::write(
        &path,
        r#"[{"t": 2.0, "type": "WEAVE_L"}, {"t": 1.0, "type": "JAB_R"}, {"t": 3.0, "type": "END"}]"#,
    )
    .unwrap();

    let events = chart::load(&ChartSource::from_path(&path, SongInfo::default())).unwrap();
    assert_eq!(
        events,
        vec![ChartEvent::new(1.0, NoteKind::JabRight), ChartEvent::new(2.0, NoteKind::WeaveLeft)]
    );
}

#[test]
fn test_missing_chart_finishes_session_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let source = ChartSource::from_path(&dir.path().join("nope.json"), SongInfo::default());
    assert!(matches!(chart::load(&source), Err(ChartError::NotFound(_))));

    let events = chart::load_or_empty(&source);
    assert!(events.is_empty());
    let mut s = session(events, settings(0.25, 0.4, 0.6));
    s.command(SessionCommand::Start, 1.0);
    assert_eq!(s.phase(), SessionPhase::Finished { finished_at: 1.0 });
}

#[test]
fn test_malformed_grid_chart_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.txt");
    fs::write(&path, "10x2").unwrap();
    assert!(matches!(
        chart::load(&ChartSource::from_path(&path, SongInfo::default())),
        Err(ChartError::Malformed(_))
    ));
}

// ─── Config ────────────────────────────────────────────────────────────────

#[test]
fn test_config_file_round_trip_and_level_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut cfg = GameConfig::default();
    cfg.rules.countdown_secs = 1.5;
    cfg.save(&path).unwrap();

    let loaded = GameConfig::load(&path).unwrap();
    assert_eq!(loaded.rules.countdown_secs, 1.5);
    let hard = loaded.settings(Some("Hard"));
    assert!((hard.thresholds.perfect - 0.1875).abs() < 1e-12);
    assert_eq!(hard.score_multiplier, 1.5);
}

#[test]
fn test_invalid_config_values_are_substituted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
        &path,
        r#"{"difficulty": {"song_info": {"bpm": 0, "division": 0},
            "judge_timing_base": {"perfect": 0.5, "great": 0.2, "good": 0.1}}}"#,
    )
    .unwrap();

    let cfg = GameConfig::load(&path).unwrap();
    assert_eq!(cfg.difficulty.song_info, SongInfo::default());
    assert_eq!(cfg.difficulty.judge_timing_base, JudgeThresholds::default());
}

#[test]
fn test_unreadable_config_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(GameConfig::load(&path).is_none());
    let cfg = GameConfig::load_or_default(&path);
    assert_eq!(cfg.rules.countdown_secs, 3.0);
}

// ─── Judgment scenarios ────────────────────────────────────────────────────

#[test]
fn test_single_jab_graded_great() {
    let g = TargetGeometry::default();
    let mut s = session(vec![ChartEvent::new(1.0, NoteKind::JabLeft)], settings(0.1, 0.2, 0.3));
    let start = begin(&mut s);

    let at = start + 1.15;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabLeft, at)]), &g);
    assert_eq!(r.outcomes.len(), 1);
    match r.outcomes[0] {
        JudgmentOutcome::Hit { grade, delta, .. } => {
            assert_eq!(grade, JudgmentGrade::Great);
            assert!((delta - 0.15).abs() < 1e-9);
        }
        other => panic!("expected hit, got {:?}", other),
    }
    assert_eq!(r.score, 200);
    assert_eq!(r.combo, 1);
}

#[test]
fn test_unanswered_jab_times_out() {
    let g = TargetGeometry::default();
    let mut s = session(vec![ChartEvent::new(1.0, NoteKind::JabLeft)], settings(0.1, 0.2, 0.3));
    let start = begin(&mut s);

    // Deadline is 1.0 + 0.3 * 1.2 = 1.36.
    let r = s.tick(start + 1.35, snapshot(start + 1.35, Vec::new()), &g);
    assert!(r.outcomes.is_empty());
    assert_eq!(r.live_notes.len(), 1);

    let r = s.tick(start + 1.57, snapshot(start + 1.57, Vec::new()), &g);
    assert_eq!(r.outcomes.len(), 1);
    assert!(matches!(r.outcomes[0], JudgmentOutcome::Miss { cause: MissCause::Timeout, .. }));
    assert_eq!(r.combo, 0);
    assert_eq!(r.tally.get(JudgmentGrade::Miss), 1);
    assert!(matches!(r.phase, SessionPhase::Finished { .. }));
}

#[test]
fn test_timeout_uses_good_window_and_multiplier() {
    let g = TargetGeometry::default();
    let mut s = session(vec![ChartEvent::new(2.0, NoteKind::JabRight)], settings(0.2, 0.35, 0.5));
    let start = begin(&mut s);

    for t in [1.0, 2.0, 2.3, 2.55] {
        let r = s.tick(start + t, snapshot(start + t, Vec::new()), &g);
        assert!(r.outcomes.is_empty(), "missed early at {}", t);
        assert!(r.live_notes.iter().all(|n| n.is_pending()));
    }
    let r = s.tick(start + 2.65, snapshot(start + 2.65, Vec::new()), &g);
    assert_eq!(r.outcomes.len(), 1);
    assert_eq!(r.retired[0].resolution(), Resolution::Missed);

    // Nothing further happens to a resolved note.
    let r = s.tick(start + 3.0, snapshot(start + 3.0, Vec::new()), &g);
    assert!(r.outcomes.is_empty());
}

#[test]
fn test_closer_note_wins_regardless_of_spawn_order() {
    let g = TargetGeometry::default();
    let chart = vec![ChartEvent::new(1.0, NoteKind::JabLeft), ChartEvent::new(1.05, NoteKind::JabLeft)];

    let mut s = session(chart.clone(), settings(0.25, 0.4, 0.6));
    let start = begin(&mut s);
    let at = start + 1.04;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabLeft, at)]), &g);
    assert_eq!(r.outcomes.len(), 1);
    assert_eq!(r.outcomes[0].note_id(), 1);

    let mut s = session(chart, settings(0.25, 0.4, 0.6));
    let start = begin(&mut s);
    let at = start + 1.02;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabLeft, at)]), &g);
    assert_eq!(r.outcomes.len(), 1);
    assert_eq!(r.outcomes[0].note_id(), 0);
}

#[test]
fn test_each_event_and_note_resolve_once() {
    let g = TargetGeometry::default();
    let chart = vec![ChartEvent::new(1.0, NoteKind::JabRight), ChartEvent::new(1.0, NoteKind::JabRight)];
    let mut s = session(chart, settings(0.25, 0.4, 0.6));
    let start = begin(&mut s);

    // Two strikes, two notes: one each.
    let at = start + 1.0;
    let events = vec![RawMotionEvent::new(NoteKind::JabRight, at), RawMotionEvent::new(NoteKind::JabRight, at + 0.01)];
    let r = s.tick(at, snapshot(at, events), &g);
    let mut ids: Vec<u64> = r.outcomes.iter().map(|o| o.note_id()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![0, 1]);

    // A third strike finds nothing.
    let at = start + 1.1;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabRight, at)]), &g);
    assert!(r.outcomes.is_empty());
    assert_eq!(r.tally.total(), 2);
}

#[test]
fn test_grades_never_worsen_for_smaller_delta() {
    let t = JudgeThresholds::new(0.1, 0.2, 0.3);
    let deltas: Vec<f64> = (0..30).map(|i| i as f64 * 0.01).collect();
    for pair in deltas.windows(2) {
        // Better grades sort first.
        assert!(t.grade(pair[0]) <= t.grade(pair[1]), "{:?}", pair);
    }
}

#[test]
fn test_combo_counts_hits_since_last_miss() {
    let mut ledger = ScoreLedger::new(ScoreRules::default(), &Telemetry::default());
    let script = [
        hit(JudgmentGrade::Perfect),
        hit(JudgmentGrade::Good),
        miss(),
        hit(JudgmentGrade::Great),
        hit(JudgmentGrade::Perfect),
        hit(JudgmentGrade::Perfect),
        miss(),
        hit(JudgmentGrade::Good),
    ];
    let mut expected = 0;
    let mut best = 0;
    for outcome in &script {
        ledger.apply(outcome);
        expected = if matches!(outcome, JudgmentOutcome::Miss { .. }) { 0 } else { expected + 1 };
        best = best.max(expected);
        assert_eq!(ledger.state().combo, expected);
    }
    assert_eq!(ledger.state().max_combo, best);
    assert_eq!(ledger.state().tally.total(), script.len() as u32);
}

#[test]
fn test_struck_hazard_costs_points_not_combo() {
    let g = TargetGeometry::default();
    let chart = vec![
        ChartEvent::new(1.0, NoteKind::JabLeft),
        ChartEvent::new(2.0, NoteKind::Hazard),
        ChartEvent::new(4.0, NoteKind::Hazard),
    ];
    let mut s = session(chart, settings(0.25, 0.4, 0.6));
    let start = begin(&mut s);

    let at = start + 1.0;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabLeft, at)]), &g);
    assert_eq!(r.score, 300);

    let at = start + 2.0;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabRight, at)]), &g);
    assert!(matches!(r.outcomes[..], [JudgmentOutcome::Penalty { .. }]));
    assert_eq!(r.score, 200);
    assert_eq!(r.combo, 1);

    // The second hazard is left alone and clears without an outcome.
    let at = start + 5.0;
    let r = s.tick(at, snapshot(at, Vec::new()), &g);
    assert!(r.outcomes.is_empty());
    assert_eq!(r.retired[0].resolution(), Resolution::Cleared);
    assert_eq!(r.score, 200);
    assert_eq!(s.score().hazards_triggered, 1);
    assert!(matches!(r.phase, SessionPhase::Finished { .. }));
}

#[test]
fn test_hazard_penalty_floors_at_zero() {
    let g = TargetGeometry::default();
    let mut s = session(vec![ChartEvent::new(1.0, NoteKind::Hazard)], settings(0.25, 0.4, 0.6));
    let start = begin(&mut s);
    let at = start + 1.0;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabLeft, at)]), &g);
    assert_eq!(r.outcomes.len(), 1);
    assert_eq!(r.score, 0);
}

#[test]
fn test_weave_never_entered_misses_exactly_once() {
    let g = TargetGeometry::default();
    let mut s = session(vec![ChartEvent::new(1.0, NoteKind::WeaveLeft)], settings(0.25, 0.4, 0.6));
    let start = begin(&mut s);

    let mut misses = 0;
    let mut t = 0.0;
    while t < 3.0 {
        let r = s.tick(start + t, snapshot(start + t, Vec::new()), &g);
        misses += r
            .outcomes
            .iter()
            .filter(|o| matches!(o, JudgmentOutcome::Miss { cause: MissCause::OutOfRegion, .. }))
            .count();
        t += TICK;
    }
    assert_eq!(misses, 1);
    assert_eq!(s.score().tally.total(), 1);
}

#[test]
fn test_timing_offset_shifts_judgment() {
    let g = TargetGeometry::default();
    let mut cfg = GameConfig::default();
    cfg.rules.timing_offset = -0.2;
    let mut s = PlaySession::new(
        &cfg,
        settings(0.1, 0.2, 0.3),
        vec![ChartEvent::new(1.0, NoteKind::JabLeft)],
        JudgmentMode::Normal,
        &Telemetry::default(),
    );
    let start = begin(&mut s);
    // Raw event is 0.2 s late; the offset pulls it back on time.
    let at = start + 1.2;
    let r = s.tick(at, snapshot(at, vec![RawMotionEvent::new(NoteKind::JabLeft, at)]), &g);
    assert_eq!(r.outcomes[0].grade(), Some(JudgmentGrade::Perfect));
}

// ─── Full pipeline ─────────────────────────────────────────────────────────

fn song() -> Vec<ChartEvent> {
    vec![
        ChartEvent::new(1.0, NoteKind::JabLeft),
        ChartEvent::new(2.0, NoteKind::JabRight),
        ChartEvent::new(3.0, NoteKind::WeaveLeft),
        ChartEvent::new(4.0, NoteKind::WeaveRight),
        ChartEvent::new(5.0, NoteKind::Hazard),
    ]
}

#[test]
fn test_pipeline_scripted_player_clears_song() {
    let (outcomes, report, _) = play_scripted(song(), JudgmentMode::Normal, 0.0);

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.grade() == Some(JudgmentGrade::Perfect)));
    let mut kinds: Vec<NoteKind> = outcomes.iter().map(|o| o.note_kind()).collect();
    kinds.sort();
    assert_eq!(
        kinds,
        vec![NoteKind::JabLeft, NoteKind::JabRight, NoteKind::WeaveLeft, NoteKind::WeaveRight]
    );
    assert_eq!(report.score, 1200);
    assert_eq!(report.max_combo, 4);
    assert_eq!(report.tally.get(JudgmentGrade::Miss), 0);
    assert!(matches!(report.phase, SessionPhase::Finished { .. }));
}

#[test]
fn test_pipeline_start_calibrates_then_clears_song() {
    let (outcomes, report, coord) = perform(song(), JudgmentMode::Normal, 0.0, SessionCommand::Start);

    assert!(coord.session().machine().calibrated());
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.grade() == Some(JudgmentGrade::Perfect)));
    assert_eq!(report.score, 1200);
    assert_eq!(report.tally.get(JudgmentGrade::Miss), 0);
}

#[test]
fn test_pipeline_diagnostics_reach_subscribers() {
    let (mut coord, input_tx, reports) = pipeline(song(), JudgmentMode::Normal);
    input_tx
        .send(InputEvent::Command(SessionCommand::SkipCalibration { diagnostic: true }))
        .unwrap();
    coord.step(0.0);
    coord.step(3.0);
    let reading = SensorReading::new(4.0, None)
        .with_action(NoteKind::JabLeft, 4.0)
        .with_action(NoteKind::JabLeft, 4.02);
    input_tx.send(InputEvent::Sensor(reading)).unwrap();
    coord.step(4.0);

    let records: Vec<_> = reports.try_iter().flat_map(|r| r.diagnostics).collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|d| d.event_kind == NoteKind::JabLeft));
    assert_eq!(records[0].nearest_delta, Some(0.0));
    assert_eq!(records[1].nearest_delta, None);
}

#[test]
fn test_pipeline_late_player_loses_grades() {
    // 0.37 s late: jabs grade Great, weaves fall outside their window.
    let (outcomes, report, _) = play_scripted(song(), JudgmentMode::Normal, 0.37);

    let jabs: Vec<_> = outcomes
        .iter()
        .filter(|o| o.note_kind().sense_mode() == SenseMode::Strike)
        .collect();
    assert_eq!(jabs.len(), 2);
    assert!(jabs.iter().all(|o| o.grade() == Some(JudgmentGrade::Great)));
    assert_eq!(report.tally.get(JudgmentGrade::Miss), 2);
    assert_eq!(report.combo, 0);
}

#[test]
fn test_pipeline_diagnostic_mode_matches_normal() {
    let (normal, normal_report, normal_diag) = play_scripted(song(), JudgmentMode::Normal, 0.1);
    let (diag, diag_report, diag_count) = play_scripted(song(), JudgmentMode::Diagnostic, 0.1);

    assert_eq!(normal, diag);
    assert_eq!(normal_report.score, diag_report.score);
    assert_eq!(normal_report.tally, diag_report.tally);
    assert_eq!(normal_diag, 0);
    assert!(diag_count > 0);
}

#[test]
fn test_pipeline_reset_replays_from_start() {
    let (mut coord, input_tx, _reports) = pipeline(song(), JudgmentMode::Normal);
    input_tx
        .send(InputEvent::Command(SessionCommand::SkipCalibration { diagnostic: false }))
        .unwrap();
    coord.step(0.0);
    coord.step(3.0);
    input_tx
        .send(InputEvent::Sensor(SensorReading::new(4.0, None).with_action(NoteKind::JabLeft, 4.0)))
        .unwrap();
    let r = coord.step(4.0);
    assert_eq!(r.score, 300);

    input_tx.send(InputEvent::Command(SessionCommand::Reset)).unwrap();
    let r = coord.step(4.1);
    assert_eq!(r.phase, SessionPhase::Idle);
    assert_eq!(r.score, 0);
    assert!(r.live_notes.is_empty());
    assert!(coord.session().pending_events().is_empty());
}

#[test]
fn test_pipeline_lost_sensor_times_out_notes() {
    let (mut coord, input_tx, _reports) = pipeline(vec![ChartEvent::new(0.5, NoteKind::JabLeft)], JudgmentMode::Normal);
    input_tx.send(InputEvent::Command(SessionCommand::Start)).unwrap();
    // No readings ever arrive: calibration is unavailable, straight to countdown.
    let r = coord.step(0.0);
    assert!(matches!(r.phase, SessionPhase::Countdown { .. }));

    let mut t = 0.0;
    let mut last = r;
    while t < 10.0 && !last.results_due {
        t += TICK;
        last = coord.step(t);
    }
    assert_eq!(last.tally.get(JudgmentGrade::Miss), 1);
    assert!(last.results_due);
}

#[test]
fn test_pipeline_threads_end_to_end() {
    let mut cfg = GameConfig::default();
    cfg.rules.countdown_secs = 0.5;
    cfg.rules.finish_delay = 0.2;
    let chart = vec![ChartEvent::new(0.5, NoteKind::JabRight)];
    let telemetry = Telemetry::new("threads");
    let clock = SessionClock::new();

    let (input_tx, input_rx) = bounded::<InputEvent>(4096);
    let (report_tx, report_rx) = bounded::<TickReport>(4096);

    let sim = Simulator::new(clock.clone(), input_tx.clone(), chart.clone(), TargetGeometry::from_layout(&cfg.layout), 120)
        .with_play_offset(cfg.rules.countdown_secs);
    let sim_handle = thread::Builder::new()
        .name("test-simulator".into())
        .spawn(move || {
            let mut sim = sim;
            sim.run();
        })
        .unwrap();

    let session = PlaySession::new(&cfg, cfg.settings(None), chart, JudgmentMode::Normal, &telemetry);
    let layout = cfg.layout.clone();
    let coord_clock = clock.clone();
    let coord_handle = thread::Builder::new()
        .name("test-coordinator".into())
        .spawn(move || {
            Coordinator::new(input_rx, vec![report_tx], session, layout, &telemetry)
                .with_tick_rate(120.0)
                .run(&coord_clock)
        })
        .unwrap();

    input_tx
        .send(InputEvent::Command(SessionCommand::SkipCalibration { diagnostic: false }))
        .unwrap();
    drop(input_tx);

    let final_score = coord_handle.join().unwrap();
    // Coordinator gone: the simulator's next send fails and it stops.
    sim_handle.join().unwrap();

    let reports: Vec<TickReport> = report_rx.try_iter().collect();
    assert!(reports.last().map_or(false, |r| r.results_due));
    assert_eq!(final_score.tally.total(), 1);
    assert_eq!(final_score.tally.get(JudgmentGrade::Miss), 0);
    assert!(final_score.score > 0);
}
