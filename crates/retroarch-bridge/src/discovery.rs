//! Network command discovery
//!
//! RetroArch builds differ in which network commands they answer. This
//! tries a fixed catalogue and reports what replied, so the memory-read
//! verb and pause handling can be checked before running the bridge.

use crate::command::{CommandChannel, preview};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Reply timeout used while probing
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_millis(200);

/// Characters of each reply shown in the report
const PREVIEW_CHARS: usize = 80;

/// How a section's replies are judged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    /// Works or fails from the reply alone
    Reply,
    /// Silence is inconclusive, a reply is judged
    SilenceUnclear,
    /// Effects are only visible in the game; always unclear
    Observe,
}

/// Outcome for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Works,
    Fails,
    Unclear,
}

impl Verdict {
    pub fn mark(self) -> &'static str {
        match self {
            Verdict::Works => "✓",
            Verdict::Fails => "✗",
            Verdict::Unclear => "?",
        }
    }
}

/// A group of commands tried together
#[derive(Debug, Clone, Copy)]
pub struct Section {
    pub title: &'static str,
    pub commands: &'static [&'static str],
    pub judgement: Judgement,
    /// Pause after each command
    pub delay: Option<Duration>,
    /// Commands are memory-read syntaxes
    pub reads_memory: bool,
}

/// The first section decides whether the emulator is reachable at all
pub const CATALOGUE: &[Section] = &[
    Section {
        title: "BASIC CONNECTIVITY",
        commands: &[
            "VERSION",
            "GET_STATUS",
            "GET_CONFIG_PARAM version",
            "SHOW_MSG Testing connection",
        ],
        judgement: Judgement::Reply,
        delay: None,
        reads_memory: false,
    },
    Section {
        title: "MEMORY READ COMMANDS",
        commands: &[
            "READ_CORE_RAM 02036E48 1",
            "READ_CORE_RAM 0x02036E48 1",
            "READ_CORE_MEMORY 02036E48 1",
            "READ_CORE_MEMORY 0x02036E48 1",
            "PEEK 0x02036E48",
            "READ_MEMORY 0x02036E48 1",
            "READ_CORE_RAM 02000000 16",
        ],
        judgement: Judgement::Reply,
        delay: None,
        reads_memory: true,
    },
    Section {
        title: "INPUT COMMANDS",
        commands: &[
            "A",
            "B",
            "UP",
            "INPUT PRESSED A",
            "INPUT RELEASED A",
            "PRESS A",
            "RELEASE A",
            "KEY_A",
            "input_state 0 1 0 0",
        ],
        judgement: Judgement::Observe,
        delay: Some(Duration::from_millis(50)),
        reads_memory: false,
    },
    Section {
        title: "FRAME & STATE COMMANDS",
        commands: &[
            "FRAMEADVANCE",
            "FRAME_ADVANCE",
            "PAUSE_TOGGLE",
            "PAUSE",
            "UNPAUSE",
            "FAST_FORWARD",
            "FAST_FORWARD_HOLD",
            "SLOWMOTION",
            "SCREENSHOT",
            "SAVE_STATE",
            "LOAD_STATE",
            "GET_STATE",
        ],
        judgement: Judgement::SilenceUnclear,
        delay: None,
        reads_memory: false,
    },
    Section {
        title: "VIDEO/SCREENSHOT COMMANDS",
        commands: &["SCREENSHOT", "GET_FRAMECOUNT", "GET_SCREEN", "SCREENSHOT_PNG"],
        judgement: Judgement::Observe,
        delay: None,
        reads_memory: false,
    },
];

/// A reply counts as working when present, without `ERROR`, and not `-1`
pub fn reply_works(reply: Option<&str>) -> bool {
    matches!(reply, Some(r) if !r.contains("ERROR") && r != "-1")
}

fn judge(judgement: Judgement, reply: Option<&str>) -> Verdict {
    match judgement {
        Judgement::Observe => Verdict::Unclear,
        Judgement::SilenceUnclear if reply.is_none() => Verdict::Unclear,
        _ if reply_works(reply) => Verdict::Works,
        _ => Verdict::Fails,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCheck {
    pub command: String,
    pub reply: Option<String>,
    pub verdict: Verdict,
}

#[derive(Debug, Clone)]
pub struct SectionReport {
    pub title: &'static str,
    pub checks: Vec<CommandCheck>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub sections: Vec<SectionReport>,
    /// Whether any connectivity command got a reply
    pub connected: bool,
    /// Verb of the first memory-read command that worked
    pub memory_command: Option<String>,
}

/// Try `sections` in order. Stops after the first section when nothing
/// in it replied.
pub async fn discover(channel: &mut CommandChannel, sections: &[Section]) -> DiscoveryReport {
    let mut report = DiscoveryReport {
        sections: Vec::new(),
        connected: false,
        memory_command: None,
    };

    for (index, section) in sections.iter().enumerate() {
        debug!("Trying {}", section.title);
        let mut checks = Vec::with_capacity(section.commands.len());
        for &command in section.commands {
            let reply = channel.send(command).await;
            let verdict = judge(section.judgement, reply.as_deref());
            checks.push(CommandCheck {
                command: command.to_string(),
                reply,
                verdict,
            });
            if let Some(delay) = section.delay {
                sleep(delay).await;
            }
        }

        if index == 0 {
            report.connected = checks.iter().any(|c| c.reply.is_some());
        }
        if section.reads_memory && report.memory_command.is_none() {
            report.memory_command = checks
                .iter()
                .find(|c| c.verdict == Verdict::Works)
                .and_then(|c| c.command.split_whitespace().next())
                .map(str::to_string);
        }

        report.sections.push(SectionReport {
            title: section.title,
            checks,
        });

        if index == 0 && !report.connected {
            break;
        }
    }

    report
}

impl fmt::Display for DiscoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "RetroArch Network Command Discovery")?;
        writeln!(f, "{}", rule)?;

        for (i, section) in self.sections.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "[{}] {}", i + 1, section.title)?;
            writeln!(f, "{}", "-".repeat(40))?;
            for check in &section.checks {
                match &check.reply {
                    Some(reply) => writeln!(
                        f,
                        "  {} {}\n      -> {}",
                        check.verdict.mark(),
                        check.command,
                        preview(reply, PREVIEW_CHARS)
                    )?,
                    None => writeln!(
                        f,
                        "  {} {} (no response)",
                        check.verdict.mark(),
                        check.command
                    )?,
                }
            }
        }

        if !self.connected {
            writeln!(f)?;
            writeln!(f, "No responses received! Please verify:")?;
            writeln!(f, "  1. RetroArch is running")?;
            writeln!(f, "  2. A game is loaded (not just the menu)")?;
            writeln!(f, "  3. Settings > Network > Network Commands = ON")?;
            return write!(f, "  4. The command port (default 55355) is correct");
        }

        writeln!(f)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "{}", rule)?;
        match &self.memory_command {
            Some(verb) => write!(f, "✓ Memory reading works! Use: {}", verb),
            None => write!(f, "✗ Memory reading via network doesn't seem supported"),
        }
    }
}
