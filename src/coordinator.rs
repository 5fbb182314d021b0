use crate::config::LayoutConfig;
use crate::motion::SensorReading;
use crate::note::TargetGeometry;
use crate::score::ScoreState;
use crate::session::{PlaySession, SessionPhase, TickReport};
use crate::telemetry::Telemetry;
use crate::types::{InputEvent, SessionClock};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::time::Duration;

/// Readings older than this are treated as a lost sensor.
const DEFAULT_STALE_AFTER: f64 = 0.25;

/// The coordinator drives a `PlaySession` at a fixed tick rate.
///
/// Each tick it drains the input channel (sensor readings and operator
/// commands), keeps only the newest reading, adapts it against this tick's
/// geometry, runs the session pipeline, and sends the `TickReport` to every
/// subscriber.
///
/// A reading is judged once for events. Until a newer one arrives it keeps
/// feeding the spatial probe and calibration check, up to `stale_after`
/// seconds; after that the sensor counts as unavailable.
pub struct Coordinator {
    input_rx: Receiver<InputEvent>,
    report_txs: Vec<Sender<TickReport>>,
    session: PlaySession,
    layout: LayoutConfig,
    tick_interval: Duration,
    stale_after: f64,
    latest: Option<SensorReading>,
    disconnected: bool,
    tick_count: u64,
    diagnostic_count: usize,
    log: Telemetry,
}

impl Coordinator {
    pub fn new(
        input_rx: Receiver<InputEvent>,
        report_txs: Vec<Sender<TickReport>>,
        session: PlaySession,
        layout: LayoutConfig,
        telemetry: &Telemetry,
    ) -> Self {
        Self {
            input_rx,
            report_txs,
            session,
            layout,
            tick_interval: Duration::from_secs_f64(1.0 / 60.0),
            stale_after: DEFAULT_STALE_AFTER,
            latest: None,
            disconnected: false,
            tick_count: 0,
            diagnostic_count: 0,
            log: telemetry.scoped("beat_boxer::coordinator"),
        }
    }

    pub fn with_tick_rate(mut self, hz: f64) -> Self {
        if hz.is_finite() && hz > 0.0 {
            self.tick_interval = Duration::from_secs_f64(1.0 / hz);
        } else {
            self.log.warn(format_args!("ignoring tick rate {}", hz));
        }
        self
    }

    pub fn with_stale_after(mut self, secs: f64) -> Self {
        self.stale_after = secs;
        self
    }

    pub fn session(&self) -> &PlaySession {
        &self.session
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    /// Diagnostic records reported so far.
    pub fn diagnostic_count(&self) -> usize {
        self.diagnostic_count
    }

    /// Run one tick at `now` (session clock seconds).
    pub fn step(&mut self, now: f64) -> TickReport {
        self.drain_input(now);

        let geometry = TargetGeometry::from_layout(&self.layout);
        let stale_after = self.stale_after;
        let reading = self
            .latest
            .as_ref()
            .filter(|r| now - r.timestamp <= stale_after);
        let snapshot = self.session.adapt(now, reading, &geometry);
        if let Some(r) = self.latest.as_mut() {
            r.actions.clear();
        }

        let report = self.session.tick(now, snapshot, &geometry);

        self.diagnostic_count += report.diagnostics.len();

        for tx in &self.report_txs {
            let _ = tx.send(report.clone());
        }

        self.tick_count += 1;
        if self.tick_count % 600 == 0 {
            self.log.debug(format_args!(
                "{} ticks, phase {}, score {}",
                self.tick_count,
                report.phase.name(),
                report.score
            ));
        }
        report
    }

    /// Tick until results are due or every input sender is gone.
    /// Returns the final score.
    pub fn run(&mut self, clock: &SessionClock) -> ScoreState {
        self.log.info(format_args!(
            "Coordinator running at {:.0} Hz",
            1.0 / self.tick_interval.as_secs_f64()
        ));
        let ticker = crossbeam_channel::tick(self.tick_interval);
        loop {
            if ticker.recv().is_err() {
                break;
            }
            let report = self.step(clock.now_secs());
            if report.results_due {
                self.log.info(format_args!("Results due, stopping"));
                break;
            }
            if self.disconnected {
                self.log.info(format_args!("Input closed in phase {}", report.phase.name()));
                break;
            }
        }
        self.log.info(format_args!(
            "Coordinator shutting down after {} ticks ({} diagnostic records)",
            self.tick_count, self.diagnostic_count
        ));
        self.session.score().clone()
    }

    /// Commands apply after every reading in the same drain, whatever order
    /// they were queued in.
    fn drain_input(&mut self, now: f64) {
        let mut commands = Vec::new();
        loop {
            match self.input_rx.try_recv() {
                Ok(InputEvent::Sensor(reading)) => self.accept_reading(reading),
                Ok(InputEvent::Command(cmd)) => commands.push(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        for cmd in commands {
            self.session.command(cmd, now);
        }
    }

    /// Keep the newest reading, carrying over actions from any reading it
    /// replaces before they were judged.
    fn accept_reading(&mut self, mut reading: SensorReading) {
        if let Some(prev) = self.latest.take() {
            if prev.timestamp > reading.timestamp {
                self.log.trace(format_args!("out-of-order reading at {:.3} dropped", reading.timestamp));
                self.latest = Some(prev);
                return;
            }
            let mut actions = prev.actions;
            actions.append(&mut reading.actions);
            reading.actions = actions;
        }
        // Commands drained after this reading must see the sensor.
        self.session
            .note_sensor(reading.landmarks.is_some() || !reading.actions.is_empty());
        self.latest = Some(reading);
    }
}
