//! Game configuration: rules, difficulty levels, and camera-frame layout.
//!
//! Loaded from a single JSON document with `rules`, `difficulty` and `layout`
//! sections. Every field has a default, so partial files are fine. Invalid
//! values are replaced with defaults by [`GameConfig::validate`] before any
//! component sees them; the tick loop never has to handle bad config.

use crate::judge::JudgeThresholds;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub rules: RulesConfig,
    pub difficulty: DifficultyConfig,
    pub layout: LayoutConfig,
}

// ─── Rules ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub score_base: ScoreBase,
    /// Added to every event time to compensate end-to-end sensor latency (s).
    pub timing_offset: f64,
    pub calibration_enabled: bool,
    /// Continuous in-position time required to pass calibration (s).
    pub calibration_hold_time: f64,
    pub countdown_secs: f64,
    /// Time between finishing and the results view (s).
    pub finish_delay: f64,
    /// Strike notes time out at `good * miss_multiplier` past their time.
    pub miss_multiplier: f64,
    /// Extra tolerance added to the widest grade when collecting candidates (s).
    pub match_slack: f64,
    /// Half-width of the weave judgment window (s).
    pub weave_window: f64,
    /// Every n-th consecutive hit earns a bonus. 0 disables the bonus.
    pub combo_bonus_every: u32,
    pub combo_bonus_fraction: f64,
    /// Points removed when a hazard is struck.
    pub hazard_penalty: i64,
    pub action_thresholds: ActionThresholds,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            score_base: ScoreBase::default(),
            timing_offset: 0.0,
            calibration_enabled: true,
            calibration_hold_time: 3.0,
            countdown_secs: 3.0,
            finish_delay: 2.5,
            miss_multiplier: 1.2,
            match_slack: 0.1,
            weave_window: 0.2,
            combo_bonus_every: 10,
            combo_bonus_fraction: 0.1,
            hazard_penalty: 100,
            action_thresholds: ActionThresholds::default(),
        }
    }
}

/// Base points per grade, before the difficulty multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBase {
    #[serde(rename = "PERFECT")]
    pub perfect: i64,
    #[serde(rename = "GREAT")]
    pub great: i64,
    #[serde(rename = "GOOD")]
    pub good: i64,
}

impl Default for ScoreBase {
    fn default() -> Self {
        Self {
            perfect: 300,
            great: 200,
            good: 100,
        }
    }
}

/// Strike detection thresholds for landmark-driven sensors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionThresholds {
    /// Minimum time between two strikes of the same hand (s).
    pub action_refractory: f64,
    /// Minimum fist speed, in frame widths per second.
    pub action_v_thresh: f64,
}

impl Default for ActionThresholds {
    fn default() -> Self {
        Self {
            action_refractory: 0.25,
            action_v_thresh: 1.0,
        }
    }
}

// ─── Difficulty ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    pub default: String,
    pub judge_timing_base: JudgeThresholds,
    pub levels: BTreeMap<String, DifficultyLevel>,
    pub song_info: SongInfo,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        let mut levels = BTreeMap::new();
        levels.insert(
            "Easy".to_string(),
            DifficultyLevel {
                judge_timing_scale: 1.2,
                pre_spawn_time: 1.5,
                score_multiplier: 0.8,
            },
        );
        levels.insert("Normal".to_string(), DifficultyLevel::default());
        levels.insert(
            "Hard".to_string(),
            DifficultyLevel {
                judge_timing_scale: 0.75,
                pre_spawn_time: 0.9,
                score_multiplier: 1.5,
            },
        );
        Self {
            default: "Normal".to_string(),
            judge_timing_base: JudgeThresholds::default(),
            levels,
            song_info: SongInfo::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyLevel {
    pub judge_timing_scale: f64,
    /// Lead time: how long a note is visible before its scheduled time (s).
    pub pre_spawn_time: f64,
    pub score_multiplier: f64,
}

impl Default for DifficultyLevel {
    fn default() -> Self {
        Self {
            judge_timing_scale: 1.0,
            pre_spawn_time: 1.2,
            score_multiplier: 1.0,
        }
    }
}

/// Cadence for grid charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongInfo {
    pub bpm: f64,
    /// Grid steps per beat.
    pub division: u32,
    pub start_delay: f64,
}

impl SongInfo {
    pub fn seconds_per_step(&self) -> f64 {
        60.0 / self.bpm / self.division as f64
    }
}

impl Default for SongInfo {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            division: 4,
            start_delay: 0.0,
        }
    }
}

/// Resolved per-session settings for one difficulty level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaySettings {
    pub thresholds: JudgeThresholds,
    pub lead_time: f64,
    pub score_multiplier: f64,
}

// ─── Layout ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub frame_width: f64,
    pub frame_height: f64,
    /// Hit zone centre as a fraction of the frame size.
    pub hit_zone_ratio: [f64; 2],
    pub hit_zone_radius: f64,
    /// Distance from the centre line to each weave boundary (px at 1x scale).
    pub dodge_line_offset: f64,
    pub calibration_targets: CalibrationTargetsConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            frame_width: 1280.0,
            frame_height: 720.0,
            hit_zone_ratio: [0.5, 0.3],
            hit_zone_radius: 100.0,
            dodge_line_offset: 180.0,
            calibration_targets: CalibrationTargetsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationTargetsConfig {
    pub head: TargetSpec,
    pub left_fist: TargetSpec,
    pub right_fist: TargetSpec,
}

impl Default for CalibrationTargetsConfig {
    fn default() -> Self {
        Self {
            head: TargetSpec {
                pos_ratio: [0.5, 0.35],
                radius_ratio_w: 0.08,
            },
            left_fist: TargetSpec {
                pos_ratio: [0.35, 0.55],
                radius_ratio_w: 0.08,
            },
            right_fist: TargetSpec {
                pos_ratio: [0.65, 0.55],
                radius_ratio_w: 0.08,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSpec {
    pub pos_ratio: [f64; 2],
    /// Radius as a fraction of the frame width.
    pub radius_ratio_w: f64,
}

impl Default for TargetSpec {
    fn default() -> Self {
        Self {
            pos_ratio: [0.5, 0.5],
            radius_ratio_w: 0.08,
        }
    }
}

// ─── Loading & validation ───────────────────────────────────────────────────

impl GameConfig {
    /// Load from a JSON file. Returns None if file is absent or malformed.
    /// The result is already validated.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<GameConfig>(&data) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                Some(c.validated())
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|| {
            warn!("Using built-in config defaults");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn validated(mut self) -> Self {
        self.validate();
        self
    }

    /// Replace invalid values with defaults. Returns one message per
    /// substitution (each is also logged at warn level).
    pub fn validate(&mut self) -> Vec<String> {
        let mut issues = Vec::new();
        let rules_d = RulesConfig::default();
        let song_d = SongInfo::default();
        let layout_d = LayoutConfig::default();

        let r = &mut self.rules;
        fix(
            &mut issues,
            "rules.timing_offset",
            &mut r.timing_offset,
            rules_d.timing_offset,
            |v| v.is_finite(),
        );
        fix(
            &mut issues,
            "rules.calibration_hold_time",
            &mut r.calibration_hold_time,
            rules_d.calibration_hold_time,
            non_negative,
        );
        fix(
            &mut issues,
            "rules.countdown_secs",
            &mut r.countdown_secs,
            rules_d.countdown_secs,
            non_negative,
        );
        fix(
            &mut issues,
            "rules.finish_delay",
            &mut r.finish_delay,
            rules_d.finish_delay,
            non_negative,
        );
        fix(
            &mut issues,
            "rules.miss_multiplier",
            &mut r.miss_multiplier,
            rules_d.miss_multiplier,
            |v| v.is_finite() && v >= 1.0,
        );
        fix(
            &mut issues,
            "rules.match_slack",
            &mut r.match_slack,
            rules_d.match_slack,
            non_negative,
        );
        fix(&mut issues, "rules.weave_window", &mut r.weave_window, rules_d.weave_window, positive);
        fix(
            &mut issues,
            "rules.combo_bonus_fraction",
            &mut r.combo_bonus_fraction,
            rules_d.combo_bonus_fraction,
            non_negative,
        );
        fix(
            &mut issues,
            "rules.action_thresholds.action_refractory",
            &mut r.action_thresholds.action_refractory,
            rules_d.action_thresholds.action_refractory,
            non_negative,
        );
        fix(
            &mut issues,
            "rules.action_thresholds.action_v_thresh",
            &mut r.action_thresholds.action_v_thresh,
            rules_d.action_thresholds.action_v_thresh,
            positive,
        );
        if r.hazard_penalty < 0 {
            issues.push(format!("rules.hazard_penalty={} is negative", r.hazard_penalty));
            r.hazard_penalty = rules_d.hazard_penalty;
        }
        let base = r.score_base;
        if base.perfect < 0 || base.great < 0 || base.good < 0 {
            issues.push(format!("rules.score_base {:?} has negative values", base));
            r.score_base = ScoreBase::default();
        }

        let d = &mut self.difficulty;
        if !d.judge_timing_base.is_valid() {
            issues.push(format!(
                "difficulty.judge_timing_base {:?} must be positive and ordered perfect <= great <= good",
                d.judge_timing_base
            ));
            d.judge_timing_base = JudgeThresholds::default();
        }
        for (name, level) in d.levels.iter_mut() {
            let level_d = DifficultyLevel::default();
            fix(
                &mut issues,
                &format!("difficulty.levels.{}.judge_timing_scale", name),
                &mut level.judge_timing_scale,
                level_d.judge_timing_scale,
                positive,
            );
            fix(
                &mut issues,
                &format!("difficulty.levels.{}.pre_spawn_time", name),
                &mut level.pre_spawn_time,
                level_d.pre_spawn_time,
                positive,
            );
            fix(
                &mut issues,
                &format!("difficulty.levels.{}.score_multiplier", name),
                &mut level.score_multiplier,
                level_d.score_multiplier,
                non_negative,
            );
        }
        fix(&mut issues, "difficulty.song_info.bpm", &mut d.song_info.bpm, song_d.bpm, positive);
        fix(
            &mut issues,
            "difficulty.song_info.start_delay",
            &mut d.song_info.start_delay,
            song_d.start_delay,
            non_negative,
        );
        if d.song_info.division == 0 {
            issues.push("difficulty.song_info.division=0".to_string());
            d.song_info.division = song_d.division;
        }

        let l = &mut self.layout;
        fix(&mut issues, "layout.frame_width", &mut l.frame_width, layout_d.frame_width, positive);
        fix(
            &mut issues,
            "layout.frame_height",
            &mut l.frame_height,
            layout_d.frame_height,
            positive,
        );
        fix(
            &mut issues,
            "layout.hit_zone_radius",
            &mut l.hit_zone_radius,
            layout_d.hit_zone_radius,
            positive,
        );
        fix(
            &mut issues,
            "layout.dodge_line_offset",
            &mut l.dodge_line_offset,
            layout_d.dodge_line_offset,
            positive,
        );

        for issue in &issues {
            warn!("Invalid config, using default: {}", issue);
        }
        issues
    }

    /// Resolve a difficulty level: the named level, else the configured
    /// default level, else the first level, else built-in values.
    pub fn settings(&self, level: Option<&str>) -> PlaySettings {
        let d = &self.difficulty;
        let chosen = level
            .and_then(|name| d.levels.get(name))
            .or_else(|| d.levels.get(&d.default))
            .or_else(|| d.levels.values().next())
            .copied()
            .unwrap_or_default();
        if let Some(name) = level {
            if !d.levels.contains_key(name) {
                warn!("Unknown difficulty level {:?}, falling back to {:?}", name, d.default);
            }
        }
        PlaySettings {
            thresholds: d.judge_timing_base.scaled(chosen.judge_timing_scale),
            lead_time: chosen.pre_spawn_time,
            score_multiplier: chosen.score_multiplier,
        }
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn fix(issues: &mut Vec<String>, name: &str, value: &mut f64, default: f64, ok: impl Fn(f64) -> bool) {
    if !ok(*value) {
        issues.push(format!("{}={}", name, value));
        *value = default;
    }
}
