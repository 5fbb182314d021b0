use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::motion::SensorReading;
use crate::session::SessionCommand;

// ─── Geometry ───────────────────────────────────────────────────────────────

/// A point in camera-frame pixels (origin top-left, y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Linear interpolation, `t` is not clamped.
    pub fn lerp(self, to: Point2, t: f64) -> Point2 {
        Point2 {
            x: self.x + (to.x - self.x) * t,
            y: self.y + (to.y - self.y) * t,
        }
    }

    pub fn distance(self, other: Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

// ─── Note kinds ─────────────────────────────────────────────────────────────

/// How the sensor collaborator reports a given note kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseMode {
    /// Discrete velocity/impact spikes (punches).
    Strike,
    /// Continuous position checked against a target region (dodges).
    Probe,
    /// Must not be struck; any strike near it is a penalty.
    Hazard,
}

/// Closed set of chart note kinds.
/// Serializes as the chart tags ("JAB_L", "JAB_R", "WEAVE_L", "WEAVE_R", "BOMB").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoteKind {
    #[serde(rename = "JAB_L")]
    JabLeft,
    #[serde(rename = "JAB_R")]
    JabRight,
    #[serde(rename = "WEAVE_L")]
    WeaveLeft,
    #[serde(rename = "WEAVE_R")]
    WeaveRight,
    #[serde(rename = "BOMB")]
    Hazard,
}

impl NoteKind {
    pub const ALL: [NoteKind; 5] = [
        NoteKind::JabLeft,
        NoteKind::JabRight,
        NoteKind::WeaveLeft,
        NoteKind::WeaveRight,
        NoteKind::Hazard,
    ];

    /// Dense index for per-kind tables.
    pub const fn index(self) -> usize {
        match self {
            NoteKind::JabLeft => 0,
            NoteKind::JabRight => 1,
            NoteKind::WeaveLeft => 2,
            NoteKind::WeaveRight => 3,
            NoteKind::Hazard => 4,
        }
    }

    pub const fn sense_mode(self) -> SenseMode {
        match self {
            NoteKind::JabLeft | NoteKind::JabRight => SenseMode::Strike,
            NoteKind::WeaveLeft | NoteKind::WeaveRight => SenseMode::Probe,
            NoteKind::Hazard => SenseMode::Hazard,
        }
    }

    pub const fn chart_tag(self) -> &'static str {
        match self {
            NoteKind::JabLeft => "JAB_L",
            NoteKind::JabRight => "JAB_R",
            NoteKind::WeaveLeft => "WEAVE_L",
            NoteKind::WeaveRight => "WEAVE_R",
            NoteKind::Hazard => "BOMB",
        }
    }

    pub fn from_chart_tag(tag: &str) -> Option<Self> {
        match tag {
            "JAB_L" => Some(NoteKind::JabLeft),
            "JAB_R" => Some(NoteKind::JabRight),
            "WEAVE_L" => Some(NoteKind::WeaveLeft),
            "WEAVE_R" => Some(NoteKind::WeaveRight),
            "BOMB" => Some(NoteKind::Hazard),
            _ => None,
        }
    }

    /// Grid chart digits '1'..'4'. '0' (rest) and anything else return None.
    pub fn from_grid_digit(c: char) -> Option<Self> {
        match c {
            '1' => Some(NoteKind::JabLeft),
            '2' => Some(NoteKind::JabRight),
            '3' => Some(NoteKind::WeaveLeft),
            '4' => Some(NoteKind::WeaveRight),
            _ => None,
        }
    }

    /// Short label drawn on the note by the renderer.
    pub const fn label(self) -> &'static str {
        match self {
            NoteKind::JabLeft => "J",
            NoteKind::JabRight => "S",
            NoteKind::WeaveLeft => "WL",
            NoteKind::WeaveRight => "WR",
            NoteKind::Hazard => "B",
        }
    }
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.chart_tag())
    }
}

// ─── Chart data ─────────────────────────────────────────────────────────────

/// One scheduled beat. `time` is seconds from session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartEvent {
    pub time: f64,
    pub kind: NoteKind,
}

impl ChartEvent {
    pub const fn new(time: f64, kind: NoteKind) -> Self {
        Self { time, kind }
    }
}

// ─── Motion events ──────────────────────────────────────────────────────────

/// A discrete, timestamped action reported for one tick.
/// `event_time` is on the session clock (same base as `now`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMotionEvent {
    pub kind: NoteKind,
    pub event_time: f64,
    /// Set by the judgment engine once this event has been matched.
    pub consumed: bool,
}

impl RawMotionEvent {
    pub const fn new(kind: NoteKind, event_time: f64) -> Self {
        Self {
            kind,
            event_time,
            consumed: false,
        }
    }
}

// ─── Judgment grades ────────────────────────────────────────────────────────

/// Ordered best-first: `Perfect < Great < Good < Miss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JudgmentGrade {
    Perfect,
    Great,
    Good,
    Miss,
}

impl JudgmentGrade {
    pub const ALL: [JudgmentGrade; 4] = [
        JudgmentGrade::Perfect,
        JudgmentGrade::Great,
        JudgmentGrade::Good,
        JudgmentGrade::Miss,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            JudgmentGrade::Perfect => "PERFECT",
            JudgmentGrade::Great => "GREAT",
            JudgmentGrade::Good => "GOOD",
            JudgmentGrade::Miss => "MISS",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            JudgmentGrade::Perfect => 0,
            JudgmentGrade::Great => 1,
            JudgmentGrade::Good => 2,
            JudgmentGrade::Miss => 3,
        }
    }

    pub fn breaks_combo(self) -> bool {
        self == JudgmentGrade::Miss
    }
}

impl fmt::Display for JudgmentGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─── Inter-thread messages ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum InputEvent {
    Sensor(SensorReading),
    Command(SessionCommand),
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock shared by the driver and the sensor side.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
