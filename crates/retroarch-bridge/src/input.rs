//! Host keyboard injection
//!
//! RetroArch ignores button commands on its network port, so buttons are
//! pressed by simulating the keyboard keys it is bound to. The emulator
//! window must have focus.

use retro_rl_core::{Button, HostKey, KeyMap, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Key transition sent to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Down(HostKey),
    Up(HostKey),
}

/// Destination for synthetic key events
pub trait KeySink {
    fn key_down(&mut self, key: HostKey) -> Result<()>;
    fn key_up(&mut self, key: HostKey) -> Result<()>;
}

/// Logs key events instead of sending them
#[derive(Debug, Clone, Default)]
pub struct DryRunKeySink {
    events: Arc<Mutex<Vec<KeyEvent>>>,
}

impl DryRunKeySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far (shared between clones)
    pub fn events(&self) -> Vec<KeyEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn record(&self, event: KeyEvent) {
        debug!("Dry-run key {:?}", event);
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl KeySink for DryRunKeySink {
    fn key_down(&mut self, key: HostKey) -> Result<()> {
        self.record(KeyEvent::Down(key));
        Ok(())
    }

    fn key_up(&mut self, key: HostKey) -> Result<()> {
        self.record(KeyEvent::Up(key));
        Ok(())
    }
}

/// Presses buttons through a `KeySink`.
///
/// Presses are not queued; the caller sequences them.
pub struct InputInjector {
    sink: Box<dyn KeySink>,
    keys: KeyMap,
}

impl InputInjector {
    pub fn new(sink: Box<dyn KeySink>, keys: KeyMap) -> Self {
        Self { sink, keys }
    }

    pub fn keys(&self) -> &KeyMap {
        &self.keys
    }

    /// Press the button named by `token` for `hold`.
    ///
    /// Returns `Ok(false)` without touching the keyboard when the token is
    /// not a known, mapped button.
    pub async fn press(&mut self, token: &str, hold: Duration) -> Result<bool> {
        match token.parse::<Button>() {
            Ok(button) => self.press_button(button, hold).await,
            Err(e) => {
                warn!("{}", e);
                Ok(false)
            }
        }
    }

    pub async fn press_button(&mut self, button: Button, hold: Duration) -> Result<bool> {
        let Some(key) = self.keys.get(button) else {
            warn!("No key bound to button {}", button);
            return Ok(false);
        };

        debug!("Pressing {} (key {}) for {:?}", button, key, hold);
        self.sink.key_down(key)?;
        sleep(hold).await;
        self.sink.key_up(key)?;
        Ok(true)
    }
}

#[cfg(feature = "desktop")]
mod desktop {
    use super::KeySink;
    use enigo::{Direction, Enigo, Key, Keyboard, Settings};
    use retro_rl_core::{HostKey, Result, RetroRlError};

    /// Sends key events to the focused window
    pub struct DesktopKeySink {
        enigo: Enigo,
    }

    impl DesktopKeySink {
        pub fn new() -> Result<Self> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| RetroRlError::InputError(format!("keyboard init failed: {}", e)))?;
            Ok(Self { enigo })
        }

        fn send(&mut self, key: HostKey, direction: Direction) -> Result<()> {
            self.enigo
                .key(to_key(key), direction)
                .map_err(|e| RetroRlError::InputError(format!("key {} failed: {}", key, e)))
        }
    }

    fn to_key(key: HostKey) -> Key {
        match key {
            HostKey::UpArrow => Key::UpArrow,
            HostKey::DownArrow => Key::DownArrow,
            HostKey::LeftArrow => Key::LeftArrow,
            HostKey::RightArrow => Key::RightArrow,
            HostKey::Return => Key::Return,
            HostKey::Shift => Key::Shift,
            HostKey::Char(c) => Key::Unicode(c),
        }
    }

    impl KeySink for DesktopKeySink {
        fn key_down(&mut self, key: HostKey) -> Result<()> {
            self.send(key, Direction::Press)
        }

        fn key_up(&mut self, key: HostKey) -> Result<()> {
            self.send(key, Direction::Release)
        }
    }
}

#[cfg(feature = "desktop")]
pub use desktop::DesktopKeySink;

/// The host keyboard backend
#[cfg(feature = "desktop")]
pub fn keyboard_sink() -> Result<Box<dyn KeySink>> {
    Ok(Box::new(DesktopKeySink::new()?))
}

/// The host keyboard backend
#[cfg(not(feature = "desktop"))]
pub fn keyboard_sink() -> Result<Box<dyn KeySink>> {
    Err(retro_rl_core::RetroRlError::InputError(
        "built without the `desktop` feature: no keyboard backend".to_string(),
    ))
}
