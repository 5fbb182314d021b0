//! Motion signal adapter: turns sensor readings into per-tick snapshots.
//!
//! The pose collaborator hands over landmark positions in frame pixels, plus
//! any actions it already recognised on its own. From those this module derives:
//! - strike events, when a fist moves fast enough into the hit zone
//! - the spatial probe, i.e. which note regions the body currently occupies
//! - whether the player stands in the calibration pose

use crate::config::ActionThresholds;
use crate::note::TargetGeometry;
use crate::telemetry::Telemetry;
use crate::types::{NoteKind, Point2, RawMotionEvent};

// ─── Collaborator contract ──────────────────────────────────────────────────

/// Tracked body points, in frame pixels as seen on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyLandmarks {
    pub nose: Point2,
    /// Fist on the left side of the screen; throws `JabLeft`.
    pub left_fist: Point2,
    pub right_fist: Point2,
}

/// An action the collaborator detected itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedAction {
    pub kind: NoteKind,
    pub time: f64,
}

/// One sensor sample. `timestamp` is on the session clock.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub timestamp: f64,
    pub landmarks: Option<BodyLandmarks>,
    pub actions: Vec<DetectedAction>,
}

impl SensorReading {
    pub fn new(timestamp: f64, landmarks: Option<BodyLandmarks>) -> Self {
        Self {
            timestamp,
            landmarks,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, kind: NoteKind, time: f64) -> Self {
        self.actions.push(DetectedAction { kind, time });
        self
    }
}

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Per-kind "is the body in this note's region" flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpatialProbe {
    active: [bool; NoteKind::ALL.len()],
}

impl SpatialProbe {
    pub fn is_active(&self, kind: NoteKind) -> bool {
        self.active[kind.index()]
    }

    pub fn set(&mut self, kind: NoteKind, active: bool) {
        self.active[kind.index()] = active;
    }

    pub fn with(mut self, kind: NoteKind) -> Self {
        self.set(kind, true);
        self
    }
}

/// Everything the judgment pipeline needs from the sensor for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSnapshot {
    pub taken_at: f64,
    pub events: Vec<RawMotionEvent>,
    pub probe: SpatialProbe,
    pub in_position: bool,
    /// False when no usable reading arrived.
    pub sensor_available: bool,
}

impl MotionSnapshot {
    /// Sensor unavailable: no events, probe all false, not in position.
    pub fn empty(now: f64) -> Self {
        Self {
            taken_at: now,
            events: Vec::new(),
            probe: SpatialProbe::default(),
            in_position: false,
            sensor_available: false,
        }
    }
}

// ─── Adapter ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct FistSample {
    at: f64,
    left: Point2,
    right: Point2,
}

pub struct MotionSignalAdapter {
    thresholds: ActionThresholds,
    prev: Option<FistSample>,
    /// Last strike time per side: [left, right].
    last_strike: [Option<f64>; 2],
    log: Telemetry,
}

impl MotionSignalAdapter {
    pub fn new(thresholds: ActionThresholds, telemetry: &Telemetry) -> Self {
        Self {
            thresholds,
            prev: None,
            last_strike: [None, None],
            log: telemetry.scoped("beat_boxer::motion"),
        }
    }

    pub fn adapt(&mut self, reading: &SensorReading, geometry: &TargetGeometry) -> MotionSnapshot {
        let mut snapshot = MotionSnapshot::empty(reading.timestamp);
        snapshot.events = reading
            .actions
            .iter()
            .map(|a| RawMotionEvent::new(a.kind, a.time))
            .collect();

        let Some(body) = reading.landmarks else {
            // Speed is meaningless across a tracking gap.
            self.prev = None;
            snapshot.sensor_available = !snapshot.events.is_empty();
            return snapshot;
        };
        snapshot.sensor_available = true;

        self.detect_strikes(reading.timestamp, &body, geometry, &mut snapshot.events);
        snapshot.probe = probe(&body, geometry);
        snapshot.in_position = geometry.head_target.contains(body.nose)
            && geometry.left_fist_target.contains(body.left_fist)
            && geometry.right_fist_target.contains(body.right_fist);
        snapshot
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.last_strike = [None, None];
    }

    fn detect_strikes(
        &mut self,
        now: f64,
        body: &BodyLandmarks,
        geometry: &TargetGeometry,
        events: &mut Vec<RawMotionEvent>,
    ) {
        let current = FistSample {
            at: now,
            left: body.left_fist,
            right: body.right_fist,
        };
        let Some(prev) = self.prev.replace(current) else {
            return;
        };
        let dt = now - prev.at;
        if dt <= 0.0 {
            return;
        }

        let sides = [
            (NoteKind::JabLeft, prev.left, current.left),
            (NoteKind::JabRight, prev.right, current.right),
        ];
        for (side, (kind, from, to)) in sides.into_iter().enumerate() {
            let speed = from.distance(to) / geometry.frame_width / dt;
            if speed < self.thresholds.action_v_thresh || !geometry.hit_zone.contains(to) {
                continue;
            }
            let rested = self.last_strike[side]
                .map_or(true, |last| now - last > self.thresholds.action_refractory);
            if !rested {
                continue;
            }
            self.last_strike[side] = Some(now);
            self.log.debug(format_args!("strike {} at {:.3} (speed {:.2})", kind, now, speed));
            events.push(RawMotionEvent::new(kind, now));
        }
    }
}

/// Which note regions the body currently occupies.
pub fn probe(body: &BodyLandmarks, geometry: &TargetGeometry) -> SpatialProbe {
    let mut probe = SpatialProbe::default();
    let nose_x = body.nose.x;
    for kind in NoteKind::ALL {
        let active = match kind {
            NoteKind::JabLeft => geometry.hit_zone.contains(body.left_fist),
            NoteKind::JabRight => geometry.hit_zone.contains(body.right_fist),
            NoteKind::WeaveLeft => geometry.center_x < nose_x && nose_x < geometry.dodge_right_x,
            NoteKind::WeaveRight => geometry.dodge_left_x < nose_x && nose_x < geometry.center_x,
            NoteKind::Hazard => false,
        };
        probe.set(kind, active);
    }
    probe
}
