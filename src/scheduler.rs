//! Note scheduler: spawns chart events as live notes one lead time early.

use crate::note::{Note, TargetGeometry};
use crate::telemetry::Telemetry;
use crate::types::{ChartEvent, Point2};

pub struct NoteScheduler {
    chart: Vec<ChartEvent>,
    next_index: usize,
    live_notes: Vec<Note>,
    lead_time: f64,
    next_id: u64,
    log: Telemetry,
}

impl NoteScheduler {
    pub fn new(chart: Vec<ChartEvent>, lead_time: f64, telemetry: &Telemetry) -> Self {
        Self {
            chart,
            next_index: 0,
            live_notes: Vec::new(),
            lead_time,
            next_id: 0,
            log: telemetry.scoped("beat_boxer::scheduler"),
        }
    }

    /// Spawn every event whose spawn time has been reached. Returns how many
    /// notes were spawned.
    pub fn advance(&mut self, now: f64, session_start: f64, geometry: &TargetGeometry) -> usize {
        let now_rel = now - session_start;
        let mut spawned = 0;
        while let Some(event) = self.chart.get(self.next_index) {
            if event.time - self.lead_time > now_rel {
                break;
            }
            let note = Note::spawn(self.next_id, event, self.lead_time, geometry);
            self.log.trace(format_args!(
                "spawn note {} {} at t={:.3} (due {:.3})",
                note.id, note.kind, now_rel, note.scheduled_time
            ));
            self.live_notes.push(note);
            self.next_id += 1;
            self.next_index += 1;
            spawned += 1;
        }
        spawned
    }

    pub fn update_positions(&mut self, now: f64, session_start: f64, target: Point2) {
        for note in &mut self.live_notes {
            note.update_position(now, session_start, target);
        }
    }

    /// Remove and return every resolved note, keeping order.
    pub fn retire_resolved(&mut self) -> Vec<Note> {
        let (resolved, pending): (Vec<Note>, Vec<Note>) =
            self.live_notes.drain(..).partition(|n| !n.is_pending());
        self.live_notes = pending;
        resolved
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_index == self.chart.len() && self.live_notes.iter().all(|n| !n.is_pending())
    }

    pub fn reset(&mut self) {
        self.live_notes.clear();
        self.next_index = 0;
        self.next_id = 0;
    }

    pub fn live_notes(&self) -> &[Note] {
        &self.live_notes
    }

    pub fn live_notes_mut(&mut self) -> &mut [Note] {
        &mut self.live_notes
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn chart(&self) -> &[ChartEvent] {
        &self.chart
    }

    pub fn lead_time(&self) -> f64 {
        self.lead_time
    }
}
