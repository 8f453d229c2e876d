//! # retro-rl-core
//!
//! Core types shared by the RetroArch bridge tools:
//! - Game state decoded from emulator memory
//! - Captured images and normalized frames
//! - Buttons, host keys and key maps
//! - Emulator status classification
//! - Bridge configuration

pub mod action;
pub mod config;
pub mod error;
pub mod frame;
pub mod state;
pub mod status;

pub use action::{Button, HostKey, KeyMap, NO_ACTION, UnknownButton, is_no_action};
pub use config::{
    AddressTable, BridgeConfig, CaptureConfig, EmulatorConfig, ExchangeConfig, LoopConfig,
    WindowOffsets, default_base_dir,
};
pub use error::{Result, RetroRlError};
pub use frame::{CaptureRegion, Frame, PixelLayout, RawImage};
pub use state::{Direction, GameState, decode_flag};
pub use status::{EmulatorStatus, classify_status};
