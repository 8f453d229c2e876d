//! Reset the agent's learned-state files
//!
//! The model checkpoint and battle transitions are rewritten empty; the
//! transition log, exploration memory and navigation targets are kept.

use crate::exchange::write_atomic;
use retro_rl_core::{Result, RetroRlError};
use serde_json::{Value, json};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MODEL_CHECKPOINT: &str = "taught_model_checkpoint.json";
pub const TRANSITIONS: &str = "taught_transitions.json";
pub const EXPLORATION_MEMORY: &str = "taught_exploration_memory.json";
pub const NAV_TARGETS: &str = "taught_nav_targets.json";
pub const BATTLE_TRANSITIONS: &str = "taught_battle_transitions.json";

pub fn model_checkpoint_template() -> Value {
    json!({
        "timestep": 0,
        "perceptrons": {"actions": [], "entities": []},
        "debt_tracking": {
            "map_novelty_debt": {},
            "location_novelty": {},
            "visited_maps": {}
        },
        "control_mode": "move",
        "markov_stats": {"markov_action_count": 0, "curiosity_action_count": 0},
        "blend_stats": {"blend_count": 0, "last_blend_tier": 0},
        "battle_stats": {"battles_recorded": 0, "battle_buffer_size": 0}
    })
}

pub fn battle_transitions_template() -> Value {
    json!({
        "battle_sequences": [],
        "flat_frames": [],
        "metadata": {
            "total_battle_frames": 0,
            "battles_recorded": 0,
            "avg_battle_length": 0,
            "outcomes": {},
            "maps_with_battles": [],
            "most_common_sequences": [],
            "frames_with_battle_data": 0,
            "battle_data_coverage": 0.0
        }
    })
}

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    Written,
    Kept,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetEntry {
    pub file: PathBuf,
    pub action: ResetAction,
}

#[derive(Debug, Clone, Default)]
pub struct ResetOutcome {
    /// In the order the files were handled
    pub entries: Vec<ResetEntry>,
}

impl ResetOutcome {
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.with_action(ResetAction::Written)
    }

    pub fn kept(&self) -> impl Iterator<Item = &Path> {
        self.with_action(ResetAction::Kept)
    }

    fn with_action(&self, action: ResetAction) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(move |e| e.action == action)
            .map(|e| e.file.as_path())
    }
}

impl fmt::Display for ResetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.entries.len();
        for (i, entry) in self.entries.iter().enumerate() {
            let name = entry
                .file
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            match entry.action {
                ResetAction::Written => writeln!(f, "✅ {}/{} {}", i + 1, total, name)?,
                ResetAction::Kept => writeln!(f, "⏭️ {}/{} {} (kept as-is)", i + 1, total, name)?,
            }
        }
        write!(
            f,
            "Reset {} file(s), kept {}.",
            self.written().count(),
            self.kept().count()
        )
    }
}

/// Rewrite the checkpoint files under `dir`, creating `dir` if needed
pub async fn reset_checkpoints(dir: &Path) -> Result<ResetOutcome> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RetroRlError::io(dir, e))?;

    let plan: [(&str, Option<Value>); 5] = [
        (MODEL_CHECKPOINT, Some(model_checkpoint_template())),
        (TRANSITIONS, None),
        (EXPLORATION_MEMORY, None),
        (NAV_TARGETS, None),
        (BATTLE_TRANSITIONS, Some(battle_transitions_template())),
    ];

    let mut outcome = ResetOutcome::default();
    for (name, template) in plan {
        let file = dir.join(name);
        let action = match template {
            Some(template) => {
                let json = serde_json::to_string_pretty(&template)?;
                write_atomic(&file, json.as_bytes()).await?;
                info!("Reset {}", file.display());
                ResetAction::Written
            }
            None => ResetAction::Kept,
        };
        outcome.entries.push(ResetEntry { file, action });
    }
    Ok(outcome)
}
