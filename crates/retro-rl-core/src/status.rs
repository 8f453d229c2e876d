//! Emulator status classification

use serde::{Deserialize, Serialize};
use std::fmt;

/// Emulator run state as reported by `GET_STATUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmulatorStatus {
    Playing,
    Paused,
    /// Emulator is up but no content is loaded
    NoGame,
    /// No reply, or a reply that matched nothing
    Unknown,
}

/// Reply markers, checked in order. First match wins.
const STATUS_MARKERS: [(&str, EmulatorStatus); 3] = [
    ("PLAYING", EmulatorStatus::Playing),
    ("PAUSED", EmulatorStatus::Paused),
    ("CONTENTLESS", EmulatorStatus::NoGame),
];

/// Classify a `GET_STATUS` reply. A missing reply is `Unknown`.
pub fn classify_status(reply: Option<&str>) -> EmulatorStatus {
    let Some(reply) = reply else {
        return EmulatorStatus::Unknown;
    };
    STATUS_MARKERS
        .iter()
        .find(|(marker, _)| reply.contains(marker))
        .map(|(_, status)| *status)
        .unwrap_or(EmulatorStatus::Unknown)
}

impl fmt::Display for EmulatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmulatorStatus::Playing => "playing",
            EmulatorStatus::Paused => "paused",
            EmulatorStatus::NoGame => "no_game",
            EmulatorStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_replies() {
        assert_eq!(
            classify_status(Some("GET_STATUS PLAYING game_boy_advance,Pokemon - FireRed,crc32=dd88761c")),
            EmulatorStatus::Playing
        );
        assert_eq!(
            classify_status(Some("GET_STATUS PAUSED game_boy_advance,Pokemon - FireRed")),
            EmulatorStatus::Paused
        );
        assert_eq!(
            classify_status(Some("GET_STATUS CONTENTLESS")),
            EmulatorStatus::NoGame
        );
        assert_eq!(classify_status(Some("1.19.1")), EmulatorStatus::Unknown);
        assert_eq!(classify_status(None), EmulatorStatus::Unknown);
    }
}
