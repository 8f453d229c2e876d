//! Keyboard input check
//!
//! Presses one button a few times and compares the player state read before
//! and after. If nothing moved, the key events are not reaching the game.

use crate::command::CommandChannel;
use crate::input::InputInjector;
use crate::memory::StateReader;
use retro_rl_core::{Button, GameState, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

/// What changed between the two reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputVerdict {
    /// x or y changed
    Moved,
    /// Only the facing changed; the player may be blocked
    Turned,
    Unchanged,
}

impl InputVerdict {
    pub fn judge(before: &GameState, after: &GameState) -> Self {
        if before.x != after.x || before.y != after.y {
            InputVerdict::Moved
        } else if before.direction != after.direction {
            InputVerdict::Turned
        } else {
            InputVerdict::Unchanged
        }
    }
}

/// Press pattern for the check
#[derive(Debug, Clone, Copy)]
pub struct InputCheck {
    pub button: Button,
    pub presses: u32,
    pub hold: Duration,
    pub gap: Duration,
    /// Wait after the last press before reading again
    pub settle: Duration,
}

impl Default for InputCheck {
    fn default() -> Self {
        Self {
            button: Button::Down,
            presses: 5,
            hold: Duration::from_millis(150),
            gap: Duration::from_millis(50),
            settle: Duration::from_millis(300),
        }
    }
}

impl InputCheck {
    /// Press the button and read the state again.
    ///
    /// `before` is read by the caller, ahead of any countdown that gives the
    /// user time to focus the emulator window.
    pub async fn run(
        &self,
        channel: &mut CommandChannel,
        reader: &mut StateReader,
        injector: &mut InputInjector,
        before: GameState,
    ) -> Result<InputReport> {
        let mut pressed = 0;
        for i in 1..=self.presses {
            info!("Press {}/{}: {}", i, self.presses, self.button);
            if injector.press_button(self.button, self.hold).await? {
                pressed += 1;
            }
            sleep(self.gap).await;
        }
        sleep(self.settle).await;

        let after = reader.read_state(channel).await;
        Ok(InputReport {
            button: self.button,
            pressed,
            before,
            after,
            verdict: InputVerdict::judge(&before, &after),
        })
    }
}

/// Outcome of an input check
#[derive(Debug, Clone)]
pub struct InputReport {
    pub button: Button,
    /// Presses actually sent; 0 when the button has no key
    pub pressed: u32,
    pub before: GameState,
    pub after: GameState,
    pub verdict: InputVerdict,
}

fn describe(state: &GameState) -> String {
    format!(
        "pos ({}, {}) map {} facing {}",
        state.x,
        state.y,
        state.map_id,
        state.direction.name()
    )
}

impl fmt::Display for InputReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Before: {}", describe(&self.before))?;
        writeln!(f, "After:  {}", describe(&self.after))?;
        writeln!(f, "Sent {} x {}", self.pressed, self.button)?;

        match self.verdict {
            InputVerdict::Moved if self.before.y != self.after.y => write!(
                f,
                "SUCCESS: y changed {} -> {}",
                self.before.y, self.after.y
            ),
            InputVerdict::Moved => {
                write!(f, "SUCCESS: x changed {} -> {}", self.before.x, self.after.x)
            }
            InputVerdict::Turned => write!(
                f,
                "PARTIAL: facing changed {} -> {} (movement may be blocked)",
                self.before.direction.name(),
                self.after.direction.name()
            ),
            InputVerdict::Unchanged => {
                writeln!(f, "FAILED: position did not change")?;
                writeln!(f, "  - Was the RetroArch window focused during the presses?")?;
                writeln!(f, "  - Check Settings > Input > Port 1 Controls against the key map")?;
                writeln!(f, "  - Run from a terminal rather than an IDE")?;
                write!(f, "  - On macOS, grant the terminal Accessibility permission")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedTransport;
    use crate::input::{DryRunKeySink, KeyEvent};
    use retro_rl_core::{AddressTable, Direction, HostKey, KeyMap};

    const WINDOW_CMD: &str = "READ_CORE_MEMORY 02036E44 16";
    // map 5, (10, 20), facing UP
    const START: &str =
        "READ_CORE_MEMORY 02036e44 05 00 00 00 0a 00 14 00 00 00 00 00 22 00 00 00";
    // one tile down, facing DOWN
    const STEPPED: &str =
        "READ_CORE_MEMORY 02036e44 05 00 00 00 0a 00 15 00 00 00 00 00 11 00 00 00";
    // same tile, facing DOWN
    const TURNED: &str =
        "READ_CORE_MEMORY 02036e44 05 00 00 00 0a 00 14 00 00 00 00 00 11 00 00 00";

    fn quick_check() -> InputCheck {
        InputCheck {
            hold: Duration::from_millis(1),
            gap: Duration::from_millis(1),
            settle: Duration::from_millis(1),
            ..Default::default()
        }
    }

    async fn check_with(
        replies: &[&str],
        keys: KeyMap,
    ) -> (InputReport, DryRunKeySink, ScriptedTransport) {
        let transport = ScriptedTransport::new().replies(WINDOW_CMD, replies);
        let mut channel = transport.channel();
        let mut reader = StateReader::new(AddressTable::default(), 1).unwrap();
        let sink = DryRunKeySink::new();
        let mut injector = InputInjector::new(Box::new(sink.clone()), keys);

        let before = reader.read_state(&mut channel).await;
        let report = quick_check()
            .run(&mut channel, &mut reader, &mut injector, before)
            .await
            .unwrap();
        (report, sink, transport)
    }

    #[test]
    fn test_judge() {
        let before = GameState {
            x: 10,
            y: 20,
            direction: Direction::Up,
            ..Default::default()
        };
        let moved = GameState { x: 11, ..before };
        let turned = GameState {
            direction: Direction::Down,
            ..before
        };
        assert_eq!(InputVerdict::judge(&before, &moved), InputVerdict::Moved);
        assert_eq!(InputVerdict::judge(&before, &turned), InputVerdict::Turned);
        assert_eq!(InputVerdict::judge(&before, &before), InputVerdict::Unchanged);
    }

    #[tokio::test]
    async fn test_position_change_is_success() {
        let (report, sink, transport) = check_with(&[START, STEPPED], KeyMap::default()).await;

        assert_eq!(report.verdict, InputVerdict::Moved);
        assert_eq!((report.before.y, report.after.y), (20, 21));
        assert_eq!(report.pressed, 5);
        assert_eq!(transport.sent_count(WINDOW_CMD), 2);

        let events = sink.events();
        assert_eq!(events.len(), 10);
        assert_eq!(events[0], KeyEvent::Down(HostKey::DownArrow));
        assert_eq!(events[1], KeyEvent::Up(HostKey::DownArrow));
        assert!(report.to_string().contains("SUCCESS: y changed 20 -> 21"));
    }

    #[tokio::test]
    async fn test_facing_only_is_partial() {
        let (report, _, _) = check_with(&[START, TURNED], KeyMap::default()).await;
        assert_eq!(report.verdict, InputVerdict::Turned);
        assert!(report.to_string().contains("PARTIAL: facing changed UP -> DOWN"));
    }

    #[tokio::test]
    async fn test_no_change_lists_hints() {
        let (report, _, _) = check_with(&[START], KeyMap::default()).await;
        assert_eq!(report.verdict, InputVerdict::Unchanged);
        let text = report.to_string();
        assert!(text.contains("FAILED"));
        assert!(text.contains("Port 1 Controls"));
    }

    #[tokio::test]
    async fn test_unbound_button_sends_nothing() {
        let keys = KeyMap::new([(Button::A, HostKey::Char('x'))]);
        let (report, sink, _) = check_with(&[START], keys).await;
        assert_eq!(report.pressed, 0);
        assert!(sink.events().is_empty());
        assert_eq!(report.verdict, InputVerdict::Unchanged);
    }
}
