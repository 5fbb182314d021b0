use crate::motion::{BodyLandmarks, SensorReading};
use crate::note::TargetGeometry;
use crate::types::*;
use crossbeam_channel::Sender;
use log::{debug, info};
use std::thread;
use std::time::Duration;

/// How long a fist stays in the hit zone after a punch (s).
const PUNCH_HOLD: f64 = 0.1;
/// How long the head stays leaned out around a weave (s, each side).
const WEAVE_HOLD: f64 = 0.15;

/// A scripted player that performs a chart in front of a virtual camera.
///
/// Holds the calibration pose, then throws each jab into the hit zone and
/// leans into each weave region at `note time + timing_error`. Hazards are
/// never struck. `reading_at` is a pure function of the session clock, so the
/// same script can be replayed in tests without threads.
pub struct Simulator {
    clock: SessionClock,
    tx: Sender<InputEvent>,
    chart: Vec<ChartEvent>,
    geometry: TargetGeometry,
    sensor_rate_hz: u32,
    /// Session clock time at which the song is expected to start.
    play_offset: f64,
    /// Constant lateness of every action (negative = early).
    timing_error: f64,
}

impl Simulator {
    pub fn new(
        clock: SessionClock,
        tx: Sender<InputEvent>,
        chart: Vec<ChartEvent>,
        geometry: TargetGeometry,
        sensor_rate_hz: u32,
    ) -> Self {
        Self {
            clock,
            tx,
            chart,
            geometry,
            sensor_rate_hz: sensor_rate_hz.max(1),
            play_offset: 0.0,
            timing_error: 0.0,
        }
    }

    pub fn with_play_offset(mut self, secs: f64) -> Self {
        self.play_offset = secs;
        self
    }

    pub fn with_timing_error(mut self, secs: f64) -> Self {
        self.timing_error = secs;
        self
    }

    /// Stream readings at the sensor rate until the receiver goes away.
    /// Blocks the calling thread.
    pub fn run(&mut self) {
        info!(
            "Simulator starting: {} events, song at +{:.2}s, timing error {:+.0}ms",
            self.chart.len(),
            self.play_offset,
            self.timing_error * 1000.0
        );
        let period = Duration::from_secs_f64(1.0 / self.sensor_rate_hz as f64);
        let mut sent: u64 = 0;
        loop {
            let reading = self.reading_at(self.clock.now_secs());
            if self.tx.send(InputEvent::Sensor(reading)).is_err() {
                break;
            }
            sent += 1;
            if sent % 600 == 0 {
                debug!("Simulator: {} readings sent", sent);
            }
            thread::sleep(period);
        }
        info!("Simulator stopped after {} readings", sent);
    }

    /// The sensor reading the virtual player produces at session time `t`.
    pub fn reading_at(&self, t: f64) -> SensorReading {
        SensorReading::new(t, Some(self.pose_at(t)))
    }

    pub fn pose_at(&self, t: f64) -> BodyLandmarks {
        let g = &self.geometry;
        let mut pose = BodyLandmarks {
            nose: g.head_target.center,
            left_fist: g.left_fist_target.center,
            right_fist: g.right_fist_target.center,
        };

        let song_t = t - self.play_offset - self.timing_error;
        let lean = (g.dodge_right_x - g.center_x) * 0.5;
        let first = self
            .chart
            .partition_point(|e| e.time < song_t - PUNCH_HOLD.max(WEAVE_HOLD));
        for event in self.chart[first..].iter().take_while(|e| e.time <= song_t + WEAVE_HOLD) {
            let since = song_t - event.time;
            let punching = (0.0..PUNCH_HOLD).contains(&since);
            let leaning = since.abs() <= WEAVE_HOLD;
            match event.kind {
                NoteKind::JabLeft if punching => pose.left_fist = g.hit_zone.center,
                NoteKind::JabRight if punching => pose.right_fist = g.hit_zone.center,
                NoteKind::WeaveLeft if leaning => pose.nose.x = g.center_x + lean,
                NoteKind::WeaveRight if leaning => pose.nose.x = g.center_x - lean,
                _ => {}
            }
        }
        pose
    }
}
