//! Score ledger: points, combo, and per-grade tally.

use crate::config::{RulesConfig, ScoreBase};
use crate::judge::JudgmentOutcome;
use crate::telemetry::Telemetry;
use crate::types::{JudgmentGrade, NoteKind};
use serde::Serialize;
use std::collections::VecDeque;

/// Number of recent judgments kept for display.
pub const HISTORY_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRules {
    pub base: ScoreBase,
    pub multiplier: f64,
    pub combo_bonus_every: u32,
    pub combo_bonus_fraction: f64,
    pub hazard_penalty: i64,
}

impl ScoreRules {
    pub fn from_rules(rules: &RulesConfig, multiplier: f64) -> Self {
        Self {
            base: rules.score_base,
            multiplier,
            combo_bonus_every: rules.combo_bonus_every,
            combo_bonus_fraction: rules.combo_bonus_fraction,
            hazard_penalty: rules.hazard_penalty,
        }
    }

    fn base_points(&self, grade: JudgmentGrade) -> i64 {
        match grade {
            JudgmentGrade::Perfect => self.base.perfect,
            JudgmentGrade::Great => self.base.great,
            JudgmentGrade::Good => self.base.good,
            JudgmentGrade::Miss => 0,
        }
    }
}

impl Default for ScoreRules {
    fn default() -> Self {
        Self::from_rules(&RulesConfig::default(), 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Tally {
    counts: [u32; JudgmentGrade::ALL.len()],
}

impl Tally {
    pub fn get(&self, grade: JudgmentGrade) -> u32 {
        self.counts[grade.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    fn add(&mut self, grade: JudgmentGrade) {
        self.counts[grade.index()] += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LastJudgment {
    pub grade: JudgmentGrade,
    pub note_kind: NoteKind,
    pub delta: f64,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreState {
    pub score: i64,
    pub combo: u32,
    pub max_combo: u32,
    pub tally: Tally,
    pub hazards_triggered: u32,
    pub last_judgment: Option<LastJudgment>,
    /// Most recent last.
    pub history: VecDeque<LastJudgment>,
}

impl ScoreState {
    fn record(&mut self, judgment: LastJudgment) {
        self.tally.add(judgment.grade);
        self.last_judgment = Some(judgment);
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(judgment);
    }
}

pub struct ScoreLedger {
    rules: ScoreRules,
    state: ScoreState,
    log: Telemetry,
}

impl ScoreLedger {
    pub fn new(rules: ScoreRules, telemetry: &Telemetry) -> Self {
        Self {
            rules,
            state: ScoreState::default(),
            log: telemetry.scoped("beat_boxer::score"),
        }
    }

    pub fn state(&self) -> &ScoreState {
        &self.state
    }

    /// Apply one outcome. Returns the change in score.
    pub fn apply(&mut self, outcome: &JudgmentOutcome) -> i64 {
        match *outcome {
            JudgmentOutcome::Hit {
                note_kind,
                grade,
                delta,
                timestamp,
                ..
            } => {
                let s = &mut self.state;
                let base = self.rules.base_points(grade) as f64;
                let mut gained = (base * self.rules.multiplier).round() as i64;
                s.combo += 1;
                let every = self.rules.combo_bonus_every;
                if every > 0 && s.combo % every == 0 {
                    let bonus = (gained as f64 * self.rules.combo_bonus_fraction).round() as i64;
                    self.log.debug(format_args!("combo {} bonus +{}", s.combo, bonus));
                    gained += bonus;
                }
                s.max_combo = s.max_combo.max(s.combo);
                s.score += gained;
                s.record(LastJudgment {
                    grade,
                    note_kind,
                    delta,
                    timestamp,
                });
                gained
            }
            JudgmentOutcome::Miss {
                note_kind, timestamp, ..
            } => {
                let s = &mut self.state;
                if s.combo > 0 {
                    self.log.debug(format_args!("combo broken at {}", s.combo));
                }
                s.combo = 0;
                s.record(LastJudgment {
                    grade: JudgmentGrade::Miss,
                    note_kind,
                    delta: 0.0,
                    timestamp,
                });
                0
            }
            JudgmentOutcome::Penalty { .. } => {
                let s = &mut self.state;
                let before = s.score;
                s.score = (s.score - self.rules.hazard_penalty).max(0);
                s.hazards_triggered += 1;
                s.score - before
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = ScoreState::default();
    }
}
