//! File-based exchange with the agent
//!
//! The bridge publishes `game_state.json` every iteration and polls
//! `action.json`, which the agent writes at its own pace. There is no lock
//! between the two sides:
//! - the state file is replaced atomically (temp file + rename), so the
//!   agent never sees a half-written document;
//! - the action file may be missing, stale or mid-write; all of those read
//!   as "no action".

use retro_rl_core::{ExchangeConfig, Frame, GameState, Result, RetroRlError, is_no_action};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Document published for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StateDocument {
    /// `[x, y, map_id, in_battle, menu_flag, direction]`
    pub state: [u32; 6],

    /// Flattened frame, values in [0, 1]
    pub frame: Vec<f32>,

    /// `[height, width, channels]`
    pub frame_shape: [u32; 3],

    /// Always empty, kept for older agents
    #[serde(default)]
    pub palette: Vec<serde_json::Value>,

    /// Always empty, kept for older agents
    #[serde(default)]
    pub tiles: Vec<serde_json::Value>,

    #[serde(default)]
    pub dead: bool,
}

impl StateDocument {
    pub fn new(state: &GameState, frame: &Frame) -> Self {
        Self {
            state: state.to_vector(),
            frame: frame.data.clone(),
            frame_shape: frame.shape(),
            palette: Vec::new(),
            tiles: Vec::new(),
            dead: false,
        }
    }
}

/// Document written by the agent
#[derive(Debug, Clone, Deserialize)]
struct ActionDocument {
    #[serde(default)]
    action: Option<serde_json::Value>,
}

/// Write `contents` to `path` through a sibling temp file and a rename
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)
        .await
        .map_err(|e| RetroRlError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(RetroRlError::io(path, e));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "exchange".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Publishes state and polls actions
pub struct ActionExchange {
    config: ExchangeConfig,
}

impl ActionExchange {
    pub fn new(config: ExchangeConfig) -> Self {
        Self { config }
    }

    pub fn state_file(&self) -> &Path {
        &self.config.state_file
    }

    pub fn action_file(&self) -> &Path {
        &self.config.action_file
    }

    /// Create the directories holding both files
    pub async fn ensure_dir(&self) -> Result<()> {
        for file in [&self.config.state_file, &self.config.action_file] {
            if let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .await
                    .map_err(|e| RetroRlError::io(dir, e))?;
            }
        }
        Ok(())
    }

    /// Replace the state file with the current state and frame
    pub async fn publish(&self, state: &GameState, frame: &Frame) -> Result<()> {
        let document = StateDocument::new(state, frame);
        let json = serde_json::to_vec(&document)?;
        write_atomic(&self.config.state_file, &json).await
    }

    /// The agent's pending action, if any. The file is left in place.
    pub async fn poll(&self) -> Option<String> {
        let path = &self.config.action_file;
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                debug!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        let document: ActionDocument = match serde_json::from_str(&content) {
            Ok(document) => document,
            Err(e) => {
                debug!("Ignoring malformed action file: {}", e);
                return None;
            }
        };

        match document.action {
            Some(serde_json::Value::String(token)) if !is_no_action(&token) => {
                Some(token.trim().to_string())
            }
            _ => None,
        }
    }
}
