//! Live notes and the per-tick target geometry they travel toward.

use crate::config::{LayoutConfig, TargetSpec};
use crate::types::{ChartEvent, JudgmentGrade, NoteKind, Point2};
use serde::Serialize;

/// Distance outside the frame where notes appear.
const OFFSCREEN_MARGIN: f64 = 100.0;

// ─── Geometry ───────────────────────────────────────────────────────────────

/// A circular target region in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetCircle {
    pub center: Point2,
    pub radius: f64,
}

impl TargetCircle {
    pub fn contains(&self, p: Point2) -> bool {
        self.center.distance(p) <= self.radius
    }
}

/// Screen-space layout for one tick, derived from `LayoutConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TargetGeometry {
    pub frame_width: f64,
    pub frame_height: f64,
    /// Where every note arrives and where fists must land.
    pub hit_zone: TargetCircle,
    pub center_x: f64,
    /// Left and right weave boundaries.
    pub dodge_left_x: f64,
    pub dodge_right_x: f64,
    pub head_target: TargetCircle,
    pub left_fist_target: TargetCircle,
    pub right_fist_target: TargetCircle,
}

impl TargetGeometry {
    pub fn from_layout(layout: &LayoutConfig) -> Self {
        let w = layout.frame_width;
        let h = layout.frame_height;
        let center_x = w * 0.5;
        let target = |spec: &TargetSpec| TargetCircle {
            center: Point2::new(w * spec.pos_ratio[0], h * spec.pos_ratio[1]),
            radius: w * spec.radius_ratio_w,
        };
        Self {
            frame_width: w,
            frame_height: h,
            hit_zone: TargetCircle {
                center: Point2::new(w * layout.hit_zone_ratio[0], h * layout.hit_zone_ratio[1]),
                radius: layout.hit_zone_radius,
            },
            center_x,
            dodge_left_x: center_x - layout.dodge_line_offset,
            dodge_right_x: center_x + layout.dodge_line_offset,
            head_target: target(&layout.calibration_targets.head),
            left_fist_target: target(&layout.calibration_targets.left_fist),
            right_fist_target: target(&layout.calibration_targets.right_fist),
        }
    }

    /// Spawn point for a note kind, just outside the frame.
    pub fn origin(&self, kind: NoteKind) -> Point2 {
        let left = -OFFSCREEN_MARGIN;
        let right = self.frame_width + OFFSCREEN_MARGIN;
        let y = self.hit_zone.center.y;
        match kind {
            NoteKind::JabLeft => Point2::new(left, y),
            NoteKind::JabRight => Point2::new(right, y),
            NoteKind::WeaveLeft => Point2::new(left, -OFFSCREEN_MARGIN),
            NoteKind::WeaveRight => Point2::new(right, -OFFSCREEN_MARGIN),
            NoteKind::Hazard => Point2::new(self.center_x, -OFFSCREEN_MARGIN),
        }
    }

    pub fn target_point(&self) -> Point2 {
        self.hit_zone.center
    }
}

impl Default for TargetGeometry {
    fn default() -> Self {
        Self::from_layout(&LayoutConfig::default())
    }
}

// ─── Notes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Resolution {
    Pending,
    Hit { grade: JudgmentGrade, delta: f64 },
    Missed,
    /// Hazard struck.
    Triggered,
    /// Hazard passed untouched.
    Cleared,
}

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: u64,
    pub kind: NoteKind,
    /// Seconds from session start.
    pub scheduled_time: f64,
    pub spawn_time: f64,
    pub origin: Point2,
    pub position: Point2,
    resolution: Resolution,
}

impl Note {
    pub fn spawn(id: u64, event: &ChartEvent, lead_time: f64, geometry: &TargetGeometry) -> Self {
        let origin = geometry.origin(event.kind);
        Self {
            id,
            kind: event.kind,
            scheduled_time: event.time,
            spawn_time: event.time - lead_time,
            origin,
            position: origin,
            resolution: Resolution::Pending,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_pending(&self) -> bool {
        self.resolution == Resolution::Pending
    }

    /// Write the final resolution. Returns false (and changes nothing) if the
    /// note is already resolved or `resolution` is `Pending`.
    pub fn resolve(&mut self, resolution: Resolution) -> bool {
        if !self.is_pending() || resolution == Resolution::Pending {
            return false;
        }
        self.resolution = resolution;
        true
    }

    /// Travel progress in [0, 1]; 1 means the note sits on the target.
    pub fn progress(&self, now: f64, session_start: f64) -> f64 {
        let lead = self.scheduled_time - self.spawn_time;
        if lead <= 0.0 {
            return 1.0;
        }
        ((now - session_start - self.spawn_time) / lead).clamp(0.0, 1.0)
    }

    pub fn update_position(&mut self, now: f64, session_start: f64, target: Point2) {
        let p = self.progress(now, session_start);
        self.position = self.origin.lerp(target, p);
    }
}
