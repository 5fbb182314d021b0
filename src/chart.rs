//! Chart loading: row-per-event JSON charts and character-grid charts.
//!
//! Both formats produce `ChartEvent`s sorted ascending by time. Works with any
//! `BufRead` for grids and any `&str` for rows; `load` picks the format from a
//! `ChartSource`.

use crate::config::SongInfo;
use crate::types::{ChartEvent, NoteKind};
use log::{info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const GRID_FILE: &str = "beatmap.txt";
pub const ROWS_FILE: &str = "beatmap.json";

/// Terminal marker in row charts; carries no note.
const END_TAG: &str = "END";

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("chart not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("malformed chart: {0}")]
    Malformed(String),
}

/// Where to load a chart from.
#[derive(Debug, Clone)]
pub enum ChartSource {
    /// JSON array of `{t, type}` rows.
    Rows(PathBuf),
    /// Character grid, timed by the given song cadence.
    Grid(PathBuf, SongInfo),
    /// A song directory holding `beatmap.txt` or `beatmap.json` (grid preferred).
    Directory(PathBuf, SongInfo),
}

#[derive(Deserialize)]
struct RawRow {
    t: f64,
    #[serde(rename = "type")]
    tag: String,
}

/// Parse a row chart. `END` rows are dropped, unknown tags are skipped.
pub fn parse_rows(json: &str) -> Result<Vec<ChartEvent>, ChartError> {
    let rows: Vec<RawRow> =
        serde_json::from_str(json).map_err(|e| ChartError::Malformed(format!("parse rows: {}", e)))?;

    let mut events = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if row.tag == END_TAG {
            continue;
        }
        if !row.t.is_finite() || row.t < 0.0 {
            return Err(ChartError::Malformed(format!(
                "row {}: invalid time {}",
                i, row.t
            )));
        }
        match NoteKind::from_chart_tag(&row.tag) {
            Some(kind) => events.push(ChartEvent::new(row.t, kind)),
            None => warn!("Chart row {}: unknown note type {:?}, skipped", i, row.tag),
        }
    }
    sort_events(&mut events);
    Ok(events)
}

/// Parse a grid chart.
///
/// Every character of a trimmed line is one step of `song.seconds_per_step()`,
/// starting at `song.start_delay`; interior spaces are rests. `#` starts a
/// comment that runs to the end of the line. Blank lines take no time.
pub fn parse_grid<R: BufRead>(reader: R, song: &SongInfo) -> Result<Vec<ChartEvent>, ChartError> {
    let step = song.seconds_per_step();
    if !step.is_finite() || step <= 0.0 {
        return Err(ChartError::Malformed(format!(
            "invalid cadence: bpm={} division={}",
            song.bpm, song.division
        )));
    }

    let mut events = Vec::new();
    let mut step_index: u64 = 0;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| ChartError::Malformed(format!("read line {}: {}", line_no + 1, e)))?;
        let content = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line.as_str(),
        };
        let lead = content.len() - content.trim_start().len();
        for (col, ch) in content.trim().chars().enumerate() {
            if ch != '0' && !ch.is_whitespace() {
                let kind = NoteKind::from_grid_digit(ch).ok_or_else(|| {
                    ChartError::Malformed(format!(
                        "line {}, column {}: unexpected character {:?}",
                        line_no + 1,
                        lead + col + 1,
                        ch
                    ))
                })?;
                events.push(ChartEvent::new(song.start_delay + step_index as f64 * step, kind));
            }
            step_index += 1;
        }
    }
    Ok(events)
}

pub fn load(source: &ChartSource) -> Result<Vec<ChartEvent>, ChartError> {
    let events = match source {
        ChartSource::Rows(path) => parse_rows(&read_to_string(path)?)?,
        ChartSource::Grid(path, song) => parse_grid(BufReader::new(open(path)?), song)?,
        ChartSource::Directory(dir, song) => {
            let grid = dir.join(GRID_FILE);
            if grid.is_file() {
                return load(&ChartSource::Grid(grid, *song));
            }
            let rows = dir.join(ROWS_FILE);
            if !rows.is_file() {
                return Err(ChartError::NotFound(dir.clone()));
            }
            return load(&ChartSource::Rows(rows));
        }
    };
    info!("Loaded chart: {} events from {}", events.len(), source.path().display());
    Ok(events)
}

/// Like `load`, but logs the failure and returns an empty chart.
pub fn load_or_empty(source: &ChartSource) -> Vec<ChartEvent> {
    load(source).unwrap_or_else(|e| {
        warn!("{}; using an empty chart", e);
        Vec::new()
    })
}

impl ChartSource {
    pub fn path(&self) -> &Path {
        match self {
            ChartSource::Rows(p) | ChartSource::Grid(p, _) | ChartSource::Directory(p, _) => p,
        }
    }

    /// Infer the format from a path: directories hold a song, `.txt` files are
    /// grids, anything else is read as rows.
    pub fn from_path(path: &Path, song: SongInfo) -> Self {
        if path.is_dir() {
            ChartSource::Directory(path.to_path_buf(), song)
        } else if path.extension().is_some_and(|ext| ext == "txt") {
            ChartSource::Grid(path.to_path_buf(), song)
        } else {
            ChartSource::Rows(path.to_path_buf())
        }
    }
}

fn sort_events(events: &mut [ChartEvent]) {
    events.sort_by(|a, b| a.time.total_cmp(&b.time));
}

fn open(path: &Path) -> Result<File, ChartError> {
    File::open(path).map_err(|e| io_error(path, e))
}

fn read_to_string(path: &Path) -> Result<String, ChartError> {
    std::fs::read_to_string(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, e: io::Error) -> ChartError {
    if e.kind() == io::ErrorKind::NotFound {
        ChartError::NotFound(path.to_path_buf())
    } else {
        ChartError::Malformed(format!("read {}: {}", path.display(), e))
    }
}
