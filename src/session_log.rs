use crate::session::TickReport;
use crossbeam_channel::Receiver;
use log::{error, info};
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Counts written by one logging run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogStats {
    pub ticks: u64,
    pub judgments: u64,
    pub diagnostics: u64,
}

/// Writes every judgment and diagnostic record of a session to JSONL files
/// under `<output_dir>/session_<unix secs>/`.
pub struct SessionLogger {
    rx: Receiver<TickReport>,
    session_dir: PathBuf,
}

impl SessionLogger {
    pub fn new(rx: Receiver<TickReport>, output_dir: &Path) -> io::Result<Self> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let session_dir = output_dir.join(format!("session_{}", timestamp));
        fs::create_dir_all(&session_dir)?;
        Ok(Self { rx, session_dir })
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Run the logger until the report channel closes. Blocks the calling thread.
    pub fn run(&self) -> io::Result<LogStats> {
        info!("Session logger → {:?}", self.session_dir);
        let mut judgments = BufWriter::new(File::create(self.session_dir.join("judgments.jsonl"))?);
        let mut diagnostics = BufWriter::new(File::create(self.session_dir.join("diagnostics.jsonl"))?);

        let mut stats = LogStats::default();
        let mut last: Option<TickReport> = None;
        for report in self.rx.iter() {
            stats.ticks += 1;
            for outcome in &report.outcomes {
                let line = json!({ "tick": report.timestamp, "outcome": outcome });
                writeln!(judgments, "{}", line)?;
                stats.judgments += 1;
            }
            for record in &report.diagnostics {
                let line = json!({
                    "tick": report.timestamp,
                    "phase": report.phase.name(),
                    "record": record,
                });
                writeln!(diagnostics, "{}", line)?;
                stats.diagnostics += 1;
            }
            if stats.ticks % 1000 == 0 {
                judgments.flush()?;
                diagnostics.flush()?;
            }
            last = Some(report);
        }
        judgments.flush()?;
        diagnostics.flush()?;

        if let Some(report) = last {
            let summary = json!({
                "ticks": stats.ticks,
                "score": report.score,
                "max_combo": report.max_combo,
                "tally": report.tally,
                "judgments": stats.judgments,
                "diagnostics": stats.diagnostics,
            });
            let text = serde_json::to_string_pretty(&summary).map_err(io::Error::other)?;
            fs::write(self.session_dir.join("summary.json"), text)
                .unwrap_or_else(|e| error!("Failed to write summary: {}", e));
        }

        info!(
            "Session saved: {} judgments, {} diagnostic records → {:?}",
            stats.judgments, stats.diagnostics, self.session_dir
        );
        Ok(stats)
    }
}
