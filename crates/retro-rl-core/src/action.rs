//! Buttons, host keys and the key map between them

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Token the agent writes when it wants nothing pressed
pub const NO_ACTION: &str = "NONE";

/// Game Boy Advance button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
    L,
    R,
}

impl Button {
    pub const ALL: [Button; 10] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::Start,
        Button::Select,
        Button::L,
        Button::R,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Button::Up => "UP",
            Button::Down => "DOWN",
            Button::Left => "LEFT",
            Button::Right => "RIGHT",
            Button::A => "A",
            Button::B => "B",
            Button::Start => "START",
            Button::Select => "SELECT",
            Button::L => "L",
            Button::R => "R",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unrecognized button token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownButton(pub String);

impl fmt::Display for UnknownButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown button: {}", self.0)
    }
}

impl std::error::Error for UnknownButton {}

impl FromStr for Button {
    type Err = UnknownButton;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_uppercase();
        Button::ALL
            .into_iter()
            .find(|b| b.name() == token)
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

/// Whether an action token means "press nothing"
pub fn is_no_action(token: &str) -> bool {
    let token = token.trim();
    token.is_empty() || token.eq_ignore_ascii_case(NO_ACTION)
}

/// Host keyboard key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKey {
    UpArrow,
    DownArrow,
    LeftArrow,
    RightArrow,
    Return,
    Shift,
    /// A printable key, by its character
    Char(char),
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostKey::UpArrow => f.write_str("up"),
            HostKey::DownArrow => f.write_str("down"),
            HostKey::LeftArrow => f.write_str("left"),
            HostKey::RightArrow => f.write_str("right"),
            HostKey::Return => f.write_str("return"),
            HostKey::Shift => f.write_str("shift"),
            HostKey::Char(c) => write!(f, "{}", c),
        }
    }
}

/// Button to host key bindings, matching the emulator's keyboard config
///
/// Deserializing applies the given bindings on top of the defaults. A
/// `null` binding unmaps the button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct KeyMap(BTreeMap<Button, HostKey>);

impl KeyMap {
    pub fn new(bindings: impl IntoIterator<Item = (Button, HostKey)>) -> Self {
        Self(bindings.into_iter().collect())
    }

    pub fn get(&self, button: Button) -> Option<HostKey> {
        self.0.get(&button).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Button, HostKey)> + '_ {
        self.0.iter().map(|(b, k)| (*b, *k))
    }
}

impl<'de> Deserialize<'de> for KeyMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let overrides = BTreeMap::<Button, Option<HostKey>>::deserialize(deserializer)?;
        let mut map = KeyMap::default();
        for (button, key) in overrides {
            match key {
                Some(key) => map.0.insert(button, key),
                None => map.0.remove(&button),
            };
        }
        Ok(map)
    }
}

impl Default for KeyMap {
    /// RetroArch's default keyboard bindings for port 1
    fn default() -> Self {
        Self::new([
            (Button::Up, HostKey::UpArrow),
            (Button::Down, HostKey::DownArrow),
            (Button::Left, HostKey::LeftArrow),
            (Button::Right, HostKey::RightArrow),
            (Button::A, HostKey::Char('x')),
            (Button::B, HostKey::Char('z')),
            (Button::Start, HostKey::Return),
            (Button::Select, HostKey::Shift),
            (Button::L, HostKey::Char('a')),
            (Button::R, HostKey::Char('s')),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_parse_is_case_insensitive() {
        assert_eq!("up".parse::<Button>().unwrap(), Button::Up);
        assert_eq!(" Start ".parse::<Button>().unwrap(), Button::Start);
        assert_eq!("select".parse::<Button>().unwrap(), Button::Select);
        assert!("JUMP".parse::<Button>().is_err());
    }

    #[test]
    fn test_no_action_tokens() {
        assert!(is_no_action("NONE"));
        assert!(is_no_action("none"));
        assert!(is_no_action(""));
        assert!(!is_no_action("A"));
    }

    #[test]
    fn test_default_keymap_covers_every_button() {
        let map = KeyMap::default();
        for button in Button::ALL {
            assert!(map.get(button).is_some(), "{} unmapped", button);
        }
        assert_eq!(map.get(Button::A), Some(HostKey::Char('x')));
        assert_eq!(map.get(Button::Start), Some(HostKey::Return));
    }

    #[test]
    fn test_keymap_json_shape() {
        let json = r#"{"A": {"char": "k"}, "START": "return"}"#;
        let map: KeyMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.get(Button::A), Some(HostKey::Char('k')));
        assert_eq!(map.get(Button::Start), Some(HostKey::Return));
        assert_eq!(map.get(Button::B), Some(HostKey::Char('z')));
        assert_eq!(map.get(Button::Up), Some(HostKey::UpArrow));
    }

    #[test]
    fn test_keymap_null_unmaps_button() {
        let map: KeyMap = serde_json::from_str(r#"{"L": null}"#).unwrap();
        assert_eq!(map.get(Button::L), None);
        assert_eq!(map.get(Button::R), Some(HostKey::Char('s')));
        assert_eq!(map.iter().count(), Button::ALL.len() - 1);
    }

    #[test]
    fn test_keymap_serializes_full_table() {
        let json = serde_json::to_value(KeyMap::default()).unwrap();
        assert_eq!(json["A"], serde_json::json!({"char": "x"}));
        assert_eq!(json["UP"], "up_arrow");
        let back: KeyMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, KeyMap::default());
    }
}
