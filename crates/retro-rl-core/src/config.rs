//! Bridge configuration
//!
//! Every value the tools need is gathered here and handed to each component
//! at construction. Defaults match RetroArch's stock network-command setup and
//! Pokemon FireRed (US) memory layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::action::KeyMap;
use crate::error::{Result, RetroRlError};
use crate::frame::{CaptureRegion, Frame};

/// Top-level configuration for the bridge tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub emulator: EmulatorConfig,
    pub addresses: AddressTable,
    pub capture: CaptureConfig,
    pub exchange: ExchangeConfig,
    pub keys: KeyMap,
    #[serde(rename = "loop")]
    pub pacing: LoopConfig,
}

impl BridgeConfig {
    /// Load from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| RetroRlError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RetroRlError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the components cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(RetroRlError::ConfigError(
                "frame width and height must be non-zero".to_string(),
            ));
        }
        if self.capture.region.width == 0 || self.capture.region.height == 0 {
            return Err(RetroRlError::ConfigError(
                "capture region must be non-empty".to_string(),
            ));
        }
        if self.pacing.flag_sample_interval == 0 {
            return Err(RetroRlError::ConfigError(
                "flag_sample_interval must be at least 1".to_string(),
            ));
        }
        self.addresses.player_window_offsets().ok_or_else(|| {
            RetroRlError::ConfigError(format!(
                "player_x, player_y and direction must lie within {} bytes after map_id",
                AddressTable::PLAYER_WINDOW
            ))
        })?;
        Ok(())
    }
}

/// RetroArch network command endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub host: String,
    pub port: u16,
    /// How long to wait for a reply datagram
    pub timeout_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 55355,
            timeout_ms: 100,
        }
    }
}

impl EmulatorConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Working-memory addresses of the game-state fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressTable {
    pub player_x: u32,
    pub player_y: u32,
    pub map_id: u32,
    /// Raw facing byte: DOWN=17, UP=34, LEFT=51, RIGHT=68
    pub direction: u32,
    /// 0 = overworld, 1 = battle
    pub battle: u32,
    /// 0 = overworld, 1 = menu, 35 = battle
    pub game_state: u32,
}

impl Default for AddressTable {
    fn default() -> Self {
        Self {
            player_x: 0x02036E48,
            player_y: 0x02036E4A,
            map_id: 0x02036E44,
            direction: 0x02036E50,
            battle: 0x0202000A,
            game_state: 0x020204C2,
        }
    }
}

/// Byte offsets of the player fields inside the window read at `map_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOffsets {
    pub x: usize,
    pub y: usize,
    pub direction: usize,
}

impl AddressTable {
    /// Bytes read in one batch starting at `map_id`
    pub const PLAYER_WINDOW: usize = 16;

    /// Offsets of x, y and direction relative to `map_id`, or `None` if any
    /// of them falls outside the batch window
    pub fn player_window_offsets(&self) -> Option<WindowOffsets> {
        let offset = |addr: u32| -> Option<usize> {
            let delta = addr.checked_sub(self.map_id)? as usize;
            (delta < Self::PLAYER_WINDOW).then_some(delta)
        };
        Some(WindowOffsets {
            x: offset(self.player_x)?,
            y: offset(self.player_y)?,
            direction: offset(self.direction)?,
        })
    }
}

/// Screen capture and downsampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub region: CaptureRegion,
    /// Output frame width in pixels
    pub width: u32,
    /// Output frame height in pixels
    pub height: u32,
    pub grayscale: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            region: CaptureRegion::default(),
            width: 60,
            height: 40,
            grayscale: false,
        }
    }
}

impl CaptureConfig {
    pub fn channels(&self) -> u32 {
        if self.grayscale { 1 } else { 3 }
    }

    pub fn value_count(&self) -> usize {
        Frame::value_count(self.width, self.height, self.grayscale)
    }
}

/// Exchange file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Published every iteration
    pub state_file: PathBuf,
    /// Written by the agent, read every iteration
    pub action_file: PathBuf,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::in_dir(default_base_dir())
    }
}

impl ExchangeConfig {
    /// Standard file names inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            state_file: dir.join("game_state.json"),
            action_file: dir.join("action.json"),
        }
    }

    /// Directory holding the state file
    pub fn base_dir(&self) -> PathBuf {
        self.state_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

/// Default directory for exchange and calibration files
pub fn default_base_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("PokeTest")
}

/// Loop pacing and sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Target iteration period (20 ms is roughly 50 FPS)
    pub period_ms: u64,
    /// How long an injected key is held
    pub hold_ms: u64,
    /// Battle and menu flags are re-read every this many polls
    pub flag_sample_interval: u64,
    /// Progress line every this many iterations
    pub log_interval: u64,
    /// Stop after this many iterations (runs until interrupted when unset)
    pub max_iterations: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            hold_ms: 60,
            flag_sample_interval: 5,
            log_interval: 60,
            max_iterations: None,
        }
    }
}

impl LoopConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.hold_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Button, HostKey};

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.emulator.address(), "127.0.0.1:55355");
        assert_eq!(config.emulator.timeout(), Duration::from_millis(100));
        assert_eq!(config.capture.value_count(), 7200);
        assert_eq!(config.pacing.flag_sample_interval, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_offsets_match_address_deltas() {
        let offsets = AddressTable::default().player_window_offsets().unwrap();
        assert_eq!(
            offsets,
            WindowOffsets {
                x: 4,
                y: 6,
                direction: 12
            }
        );
    }

    #[test]
    fn test_window_offsets_out_of_range() {
        let table = AddressTable {
            direction: 0x02036E44 + 16,
            ..Default::default()
        };
        assert!(table.player_window_offsets().is_none());

        let table = AddressTable {
            player_x: 0x02036E40,
            ..Default::default()
        };
        assert!(table.player_window_offsets().is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "emulator": {"port": 55400},
            "capture": {"grayscale": true, "region": {"left": 0, "top": 0, "width": 480, "height": 320}},
            "keys": {"A": {"char": "k"}},
            "loop": {"period_ms": 33}
        }"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.emulator.port, 55400);
        assert_eq!(config.emulator.host, "127.0.0.1");
        assert!(config.capture.grayscale);
        assert_eq!(config.capture.width, 60);
        assert_eq!(config.capture.region.width, 480);
        assert_eq!(config.keys.get(Button::A), Some(HostKey::Char('k')));
        assert_eq!(config.keys.get(Button::B), Some(HostKey::Char('z')));
        assert_eq!(config.keys.get(Button::Up), Some(HostKey::UpArrow));
        assert_eq!(config.pacing.period_ms, 33);
        assert_eq!(config.pacing.hold_ms, 60);
        assert_eq!(config.addresses, AddressTable::default());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = BridgeConfig::default();
        config.pacing.flag_sample_interval = 0;
        assert!(matches!(config.validate(), Err(RetroRlError::ConfigError(_))));
    }

    #[test]
    fn test_exchange_in_dir() {
        let exchange = ExchangeConfig::in_dir("/data/poke");
        assert_eq!(exchange.state_file, PathBuf::from("/data/poke/game_state.json"));
        assert_eq!(exchange.action_file, PathBuf::from("/data/poke/action.json"));
        assert_eq!(exchange.base_dir(), PathBuf::from("/data/poke"));
    }
}
