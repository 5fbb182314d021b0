use crate::session::{SessionPhase, TickReport};
use crate::types::JudgmentGrade;
use crossbeam_channel::Receiver;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Renders a live ASCII HUD of the play session.
pub struct ConsoleDisplay {
    rx: Receiver<TickReport>,
    tick_hz: f64,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<TickReport>, tick_hz: f64, update_hz: u32) -> Self {
        Self { rx, tick_hz, update_hz }
    }

    /// Reports received between two redraws.
    fn skip(&self) -> u64 {
        if self.update_hz == 0 {
            return 6;
        }
        (self.tick_hz / self.update_hz as f64).round().max(1.0) as u64
    }

    pub fn run(&self) {
        let skip = self.skip();
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for report in self.rx.iter() {
            count += 1;
            // Always draw the final state.
            if count % skip != 0 && !report.results_due {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", render(&report));
            let _ = stdout.flush();
        }
    }
}

pub fn render(report: &TickReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "╔══════════════════════════════════════════════╗");
    let _ = writeln!(out, "║  BEAT BOXER  Live Session                    ║");
    let _ = writeln!(out, "╠══════════════════════════════════════════════╣");
    let _ = writeln!(out, "║  Time: {:>8.2}s   Phase: {:<12}       ║", report.timestamp, report.phase.name());

    match report.phase {
        SessionPhase::Calibrating { .. } => {
            let p = report.calibration_progress.unwrap_or(0.0);
            let _ = writeln!(out, "║  Hold the pose: {} {:>3.0}%   ║", make_bar(p, 20), p * 100.0);
        }
        SessionPhase::Countdown { .. } => {
            let left = report.countdown_remaining.unwrap_or(0.0);
            let _ = writeln!(out, "║  Get ready: {:>3}                              ║", left.ceil() as u32);
        }
        SessionPhase::Finished { .. } => {
            let _ = writeln!(out, "║  Finished{:37}║", if report.results_due { "  (results)" } else { "" });
        }
        SessionPhase::Idle | SessionPhase::Playing { .. } => {
            let _ = writeln!(out, "║  Notes on screen: {:<4}                        ║", report.live_notes.len());
        }
    }

    let _ = writeln!(out, "║                                              ║");
    let _ = writeln!(out, "║  Score: {:<10} Combo: {:<5} Max: {:<5}  ║", report.score, report.combo, report.max_combo);
    match report.last_judgment {
        Some(j) => {
            let _ = writeln!(
                out,
                "║  Last: {:<8} {:<8} Δ={:.3}s             ║",
                j.grade.label(),
                j.note_kind.chart_tag(),
                j.delta
            );
        }
        None => {
            let _ = writeln!(out, "║  Last: ---                                   ║");
        }
    }
    let _ = writeln!(out, "║                                              ║");
    for grade in JudgmentGrade::ALL {
        let _ = writeln!(out, "║    {:<8} {:>5}                              ║", grade.label(), report.tally.get(grade));
    }
    let _ = writeln!(out, "╚══════════════════════════════════════════════╝");
    out
}

fn make_bar(val: f64, width: usize) -> String {
    let filled = (val.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}
