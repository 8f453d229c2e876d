//! Emulator memory reads and game-state decoding
//!
//! Uses `READ_CORE_MEMORY <addr> <len>`, which RetroArch answers with
//! `READ_CORE_MEMORY <addr> <byte> <byte> ...` in hex, or with `-1` and a
//! message when the address is not mapped.

use crate::command::CommandChannel;
use retro_rl_core::{AddressTable, GameState, Result, RetroRlError, WindowOffsets};
use tracing::debug;

const READ_COMMAND: &str = "READ_CORE_MEMORY";

/// Parse a memory-read reply for `address`, expecting `length` bytes.
///
/// Replies for a different address (a late answer to an earlier request),
/// error replies and short replies are all rejected.
pub fn parse_memory_reply(reply: &str, address: u32, length: usize) -> Option<Vec<u8>> {
    let mut tokens = reply.split_whitespace();
    if tokens.next()? != READ_COMMAND {
        return None;
    }

    let echoed = tokens.next()?;
    let echoed = echoed
        .strip_prefix("0x")
        .or_else(|| echoed.strip_prefix("0X"))
        .unwrap_or(echoed);
    if u32::from_str_radix(echoed, 16).ok()? != address {
        return None;
    }

    let bytes: Vec<u8> = tokens
        .take(length)
        .map(|t| u8::from_str_radix(t, 16).ok())
        .collect::<Option<_>>()?;
    (bytes.len() == length).then_some(bytes)
}

impl CommandChannel {
    /// Read `length` bytes at `address`
    pub async fn read_memory(&mut self, address: u32, length: usize) -> Option<Vec<u8>> {
        let reply = self
            .send(&format!("{} {:08X} {}", READ_COMMAND, address, length))
            .await?;
        let bytes = parse_memory_reply(&reply, address, length);
        if bytes.is_none() {
            debug!("Unusable memory reply for {:08X}: {}", address, reply);
        }
        bytes
    }

    pub async fn read_u8(&mut self, address: u32) -> Option<u8> {
        self.read_memory(address, 1).await.map(|b| b[0])
    }

    /// Little-endian 16-bit read
    pub async fn read_u16(&mut self, address: u32) -> Option<u16> {
        self.read_memory(address, 2)
            .await
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    }
}

/// Player fields pulled out of the batch window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerWindow {
    pub map_id: u8,
    pub x: u8,
    pub y: u8,
    pub direction_raw: u8,
}

impl PlayerWindow {
    /// Extract fields from a window read at `map_id`
    pub fn decode(window: &[u8], offsets: WindowOffsets) -> Option<Self> {
        Some(Self {
            map_id: *window.first()?,
            x: *window.get(offsets.x)?,
            y: *window.get(offsets.y)?,
            direction_raw: *window.get(offsets.direction)?,
        })
    }
}

/// Reads `GameState` each poll.
///
/// Player position, map and facing sit together in memory and come from one
/// 16-byte read. The battle and menu flags live elsewhere; they are read one
/// by one every `sample_interval` polls and reused in between, so they can
/// be up to `sample_interval - 1` polls stale.
pub struct StateReader {
    addresses: AddressTable,
    offsets: WindowOffsets,
    sample_interval: u64,
    polls: u64,
    battle_raw: u8,
    game_state_raw: u8,
    flags_sampled_at: Option<u64>,
}

impl StateReader {
    pub fn new(addresses: AddressTable, sample_interval: u64) -> Result<Self> {
        let offsets = addresses.player_window_offsets().ok_or_else(|| {
            RetroRlError::ConfigError("player fields do not fit the batch window".to_string())
        })?;
        if sample_interval == 0 {
            return Err(RetroRlError::ConfigError(
                "flag sample interval must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            addresses,
            offsets,
            sample_interval,
            polls: 0,
            battle_raw: 0,
            game_state_raw: 0,
            flags_sampled_at: None,
        })
    }

    /// Number of completed polls
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Poll index at which the battle/menu flags were last read
    pub fn flags_sampled_at(&self) -> Option<u64> {
        self.flags_sampled_at
    }

    /// Polls since the flags were last read, `None` before the first read
    pub fn flag_age(&self) -> Option<u64> {
        self.flags_sampled_at
            .map(|at| self.polls.saturating_sub(at + 1))
    }

    /// Read the current state. Fields that cannot be read are 0.
    pub async fn read_state(&mut self, channel: &mut CommandChannel) -> GameState {
        let window = channel
            .read_memory(self.addresses.map_id, AddressTable::PLAYER_WINDOW)
            .await
            .and_then(|bytes| PlayerWindow::decode(&bytes, self.offsets));

        let player = match window {
            Some(player) => player,
            None => {
                debug!("Batch read failed, falling back to single reads");
                PlayerWindow {
                    x: channel.read_u8(self.addresses.player_x).await.unwrap_or(0),
                    y: channel.read_u8(self.addresses.player_y).await.unwrap_or(0),
                    map_id: channel.read_u8(self.addresses.map_id).await.unwrap_or(0),
                    direction_raw: channel.read_u8(self.addresses.direction).await.unwrap_or(0),
                }
            }
        };

        if self.polls % self.sample_interval == 0 {
            self.battle_raw = channel.read_u8(self.addresses.battle).await.unwrap_or(0);
            self.game_state_raw = channel.read_u8(self.addresses.game_state).await.unwrap_or(0);
            self.flags_sampled_at = Some(self.polls);
        }
        self.polls += 1;

        GameState::decode(
            player.x,
            player.y,
            player.map_id,
            player.direction_raw,
            self.battle_raw,
            self.game_state_raw,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedTransport;
    use retro_rl_core::Direction;

    const WINDOW_CMD: &str = "READ_CORE_MEMORY 02036E44 16";
    const WINDOW_REPLY: &str =
        "READ_CORE_MEMORY 02036e44 05 00 00 00 0a 00 14 00 00 00 00 00 22 00 00 00";

    #[test]
    fn test_parse_reply() {
        assert_eq!(
            parse_memory_reply("READ_CORE_MEMORY 02036e48 0c", 0x02036E48, 1),
            Some(vec![12])
        );
        assert_eq!(
            parse_memory_reply("READ_CORE_MEMORY 0x02036E48 0c 01", 0x02036E48, 2),
            Some(vec![12, 1])
        );
    }

    #[test]
    fn test_parse_rejects_bad_replies() {
        // Error reply
        assert_eq!(
            parse_memory_reply("READ_CORE_MEMORY 02036e48 -1 no memory map defined", 0x02036E48, 1),
            None
        );
        // Another address
        assert_eq!(parse_memory_reply("READ_CORE_MEMORY 0202000a 01", 0x02036E48, 1), None);
        // Short
        assert_eq!(parse_memory_reply("READ_CORE_MEMORY 02036e48 01", 0x02036E48, 2), None);
        // Another command
        assert_eq!(parse_memory_reply("GET_STATUS PLAYING", 0x02036E48, 1), None);
        assert_eq!(parse_memory_reply("", 0x02036E48, 1), None);
    }

    #[test]
    fn test_window_offsets() {
        let mut window = [0u8; 16];
        window[0] = 3;
        window[4] = 7;
        window[6] = 9;
        window[12] = 51;
        let offsets = AddressTable::default().player_window_offsets().unwrap();
        assert_eq!(
            PlayerWindow::decode(&window, offsets),
            Some(PlayerWindow {
                map_id: 3,
                x: 7,
                y: 9,
                direction_raw: 51
            })
        );
        assert_eq!(PlayerWindow::decode(&window[..8], offsets), None);
    }

    #[tokio::test]
    async fn test_read_u16_little_endian() {
        let mut channel = ScriptedTransport::new()
            .reply("READ_CORE_MEMORY 02036E48 2", "READ_CORE_MEMORY 02036e48 34 12")
            .channel();
        assert_eq!(channel.read_u16(0x02036E48).await, Some(0x1234));
    }

    #[tokio::test]
    async fn test_read_state_from_batch() {
        let transport = ScriptedTransport::new().reply(WINDOW_CMD, WINDOW_REPLY);
        let mut channel = transport.channel();
        let mut reader = StateReader::new(AddressTable::default(), 5).unwrap();

        let state = reader.read_state(&mut channel).await;
        assert_eq!(state.map_id, 5);
        assert_eq!(state.x, 10);
        assert_eq!(state.y, 20);
        assert_eq!(state.direction, Direction::Up);
        assert_eq!(state.direction.index(), 1);
        // Flags unanswered: inactive
        assert_eq!(state.in_battle, 0);
        assert_eq!(state.menu_flag, 0);

        // One batch read, no single player reads
        assert_eq!(transport.sent_count(WINDOW_CMD), 1);
        assert_eq!(transport.sent_count("READ_CORE_MEMORY 02036E48 1"), 0);
    }

    #[tokio::test]
    async fn test_read_state_falls_back_to_single_reads() {
        let transport = ScriptedTransport::new()
            .reply(WINDOW_CMD, "READ_CORE_MEMORY 02036e44 -1 no memory map defined")
            .reply("READ_CORE_MEMORY 02036E48 1", "READ_CORE_MEMORY 02036e48 0b")
            .reply("READ_CORE_MEMORY 02036E44 1", "READ_CORE_MEMORY 02036e44 02")
            .reply("READ_CORE_MEMORY 02036E50 1", "READ_CORE_MEMORY 02036e50 07");
        let mut channel = transport.channel();
        let mut reader = StateReader::new(AddressTable::default(), 5).unwrap();

        let state = reader.read_state(&mut channel).await;
        assert_eq!(state.x, 11);
        // y never answered
        assert_eq!(state.y, 0);
        assert_eq!(state.map_id, 2);
        // 7 is not a facing code: 7 % 4
        assert_eq!(state.direction.index(), 3);
    }

    #[tokio::test]
    async fn test_flags_sampled_every_interval() {
        let transport = ScriptedTransport::new()
            .reply(WINDOW_CMD, WINDOW_REPLY)
            .replies(
                "READ_CORE_MEMORY 0202000A 1",
                &["READ_CORE_MEMORY 0202000a 01", "READ_CORE_MEMORY 0202000a 00"],
            )
            .reply("READ_CORE_MEMORY 020204C2 1", "READ_CORE_MEMORY 020204c2 23");
        let mut channel = transport.channel();
        let mut reader = StateReader::new(AddressTable::default(), 3).unwrap();

        assert_eq!(reader.flag_age(), None);

        let first = reader.read_state(&mut channel).await;
        assert_eq!(first.in_battle, 1);
        // 35 means battle in the game-state byte, but only 1 is a menu
        assert_eq!(first.menu_flag, 0);
        assert_eq!(reader.flags_sampled_at(), Some(0));
        assert_eq!(reader.flag_age(), Some(0));

        // Polls 1 and 2 reuse the cached battle flag
        for age in 1..3 {
            let state = reader.read_state(&mut channel).await;
            assert_eq!(state.in_battle, 1);
            assert_eq!(reader.flag_age(), Some(age));
        }
        assert_eq!(transport.sent_count("READ_CORE_MEMORY 0202000A 1"), 1);

        // Poll 3 samples again
        let fourth = reader.read_state(&mut channel).await;
        assert_eq!(fourth.in_battle, 0);
        assert_eq!(reader.flags_sampled_at(), Some(3));
        assert_eq!(transport.sent_count("READ_CORE_MEMORY 0202000A 1"), 2);
        assert_eq!(reader.polls(), 4);
    }

    #[test]
    fn test_reader_rejects_zero_interval() {
        assert!(StateReader::new(AddressTable::default(), 0).is_err());
    }
}
