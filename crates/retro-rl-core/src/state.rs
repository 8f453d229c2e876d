//! Game state decoded from emulator memory

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw facing bytes written by the game, in `Direction` order
const DIRECTION_CODES: [(u8, Direction); 4] = [
    (17, Direction::Down),
    (34, Direction::Up),
    (51, Direction::Left),
    (68, Direction::Right),
];

/// Player facing direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    Down,
    Up,
    Left,
    Right,
}

impl Direction {
    /// Decode the raw facing byte.
    ///
    /// Unknown bytes fall back to `raw % 4`, so every byte maps to a direction.
    pub fn from_raw(raw: u8) -> Self {
        DIRECTION_CODES
            .iter()
            .find(|(code, _)| *code == raw)
            .map(|(_, direction)| *direction)
            .unwrap_or_else(|| Self::from_index(raw % 4))
    }

    /// Direction for an index in 0..4 (wraps above)
    pub fn from_index(index: u8) -> Self {
        match index % 4 {
            0 => Direction::Down,
            1 => Direction::Up,
            2 => Direction::Left,
            _ => Direction::Right,
        }
    }

    /// Index reported to the agent
    pub fn index(self) -> u8 {
        match self {
            Direction::Down => 0,
            Direction::Up => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Down => "DOWN",
            Direction::Up => "UP",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode a one-byte game flag: only an exact 1 counts as active
pub fn decode_flag(raw: u8) -> u8 {
    if raw == 1 { 1 } else { 0 }
}

/// Player state sampled on one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub x: u8,
    pub y: u8,
    pub map_id: u8,
    pub direction: Direction,
    /// 1 while a battle is running
    pub in_battle: u8,
    /// 1 while a menu is open
    pub menu_flag: u8,
}

impl GameState {
    /// Build a state from raw memory bytes
    pub fn decode(
        x: u8,
        y: u8,
        map_id: u8,
        direction_raw: u8,
        battle_raw: u8,
        game_state_raw: u8,
    ) -> Self {
        Self {
            x,
            y,
            map_id,
            direction: Direction::from_raw(direction_raw),
            in_battle: decode_flag(battle_raw),
            menu_flag: decode_flag(game_state_raw),
        }
    }

    /// Flat vector in the order the agent expects:
    /// `[x, y, map_id, in_battle, menu_flag, direction]`
    pub fn to_vector(&self) -> [u32; 6] {
        [
            self.x as u32,
            self.y as u32,
            self.map_id as u32,
            self.in_battle as u32,
            self.menu_flag as u32,
            self.direction.index() as u32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::from_raw(17).index(), 0);
        assert_eq!(Direction::from_raw(34).index(), 1);
        assert_eq!(Direction::from_raw(51).index(), 2);
        assert_eq!(Direction::from_raw(68).index(), 3);
    }

    #[test]
    fn test_direction_fallback_is_mod_four() {
        for raw in [0u8, 1, 2, 3, 5, 18, 35, 100, 255] {
            if DIRECTION_CODES.iter().any(|(code, _)| *code == raw) {
                continue;
            }
            assert_eq!(Direction::from_raw(raw).index(), raw % 4, "raw byte {}", raw);
        }
    }

    #[test]
    fn test_flags_only_one_is_active() {
        assert_eq!(decode_flag(1), 1);
        for raw in [0u8, 2, 35, 255] {
            assert_eq!(decode_flag(raw), 0);
        }
    }

    #[test]
    fn test_state_vector_order() {
        let state = GameState::decode(10, 20, 5, 34, 1, 35);
        assert_eq!(state.to_vector(), [10, 20, 5, 1, 0, 1]);
        assert_eq!(state.direction, Direction::Up);
    }
}
