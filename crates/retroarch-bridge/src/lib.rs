//! RetroArch bridge for retro-rl
//!
//! Connects a learning agent to a GBA game running in RetroArch using a
//! polling approach:
//!
//! - **State**: Read from emulator memory via UDP network commands
//! - **Vision**: Screen region captured and downsampled to a small frame
//! - **Exchange**: `game_state.json` out, `action.json` in
//! - **Input**: Buttons pressed by simulating host keyboard keys
//!
//! Screen capture and keyboard simulation need the `desktop` feature.

mod bridge;
mod capture;
mod command;
mod discovery;
mod exchange;
mod input;
mod input_check;
mod memory;
mod reset;

pub use bridge::{LoopStats, LoopSummary, StepReport, VisionBridge};
pub use capture::{
    FrameCapture, FrameProcessor, FrameSource, crop_rgba, resize_area, save_preview, screen_source,
};
pub use command::{
    CommandChannel, CommandTransport, MAX_DATAGRAM, UdpTransport, command_console,
};
pub use discovery::{
    CATALOGUE, CommandCheck, DISCOVERY_TIMEOUT, DiscoveryReport, Judgement, Section, SectionReport,
    Verdict, discover, reply_works,
};
pub use exchange::{ActionExchange, StateDocument, write_atomic};
pub use input::{DryRunKeySink, InputInjector, KeyEvent, KeySink, keyboard_sink};
pub use input_check::{InputCheck, InputReport, InputVerdict};
pub use memory::{PlayerWindow, StateReader, parse_memory_reply};
pub use reset::{
    BATTLE_TRANSITIONS, EXPLORATION_MEMORY, MODEL_CHECKPOINT, NAV_TARGETS, ResetAction,
    ResetEntry, ResetOutcome, TRANSITIONS, battle_transitions_template,
    model_checkpoint_template, reset_checkpoints,
};

#[cfg(feature = "desktop")]
pub use capture::ScreenFrameSource;
#[cfg(feature = "desktop")]
pub use input::DesktopKeySink;
