//! RetroArch network command client
//!
//! RetroArch listens for plain-text commands on a UDP port (55355 by
//! default) when "Network Commands" is enabled. A command is one datagram;
//! some commands answer with one datagram, most answer with nothing.
//! Command list: https://docs.libretro.com/development/retroarch/network-control-interface/

use async_trait::async_trait;
use retro_rl_core::{EmulatorStatus, Result, RetroRlError, classify_status};
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

/// Largest reply datagram accepted
pub const MAX_DATAGRAM: usize = 4096;

/// Time the emulator gets to apply a pause toggle before status is re-read
const PAUSE_SETTLE: Duration = Duration::from_millis(100);

/// One request, at most one reply
#[async_trait]
pub trait CommandTransport: Send {
    /// Send `command` and wait up to `wait` for a reply.
    ///
    /// `Ok(None)` means nothing arrived in time.
    async fn request(&mut self, command: &[u8], wait: Duration) -> Result<Option<Vec<u8>>>;
}

/// UDP transport connected to the emulator's command port
pub struct UdpTransport {
    socket: UdpSocket,
    address: String,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to `address` (host:port)
    pub async fn connect(address: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| RetroRlError::IpcError(format!("UDP bind failed: {}", e)))?;
        socket
            .connect(address)
            .await
            .map_err(|e| RetroRlError::IpcError(format!("UDP connect to {} failed: {}", address, e)))?;

        Ok(Self {
            socket,
            address: address.to_string(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Drop replies that arrived after an earlier request timed out
    fn discard_stale(&self) {
        let mut buf = [0u8; MAX_DATAGRAM];
        while let Ok(len) = self.socket.try_recv(&mut buf) {
            debug!("Discarding stale reply ({} bytes)", len);
        }
    }
}

#[async_trait]
impl CommandTransport for UdpTransport {
    async fn request(&mut self, command: &[u8], wait: Duration) -> Result<Option<Vec<u8>>> {
        self.discard_stale();

        self.socket
            .send(command)
            .await
            .map_err(|e| RetroRlError::IpcError(format!("UDP send failed: {}", e)))?;

        let mut buf = vec![0u8; MAX_DATAGRAM];
        match timeout(wait, self.socket.recv(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(len)) => {
                buf.truncate(len);
                Ok(Some(buf))
            }
            Ok(Err(e)) => Err(RetroRlError::IpcError(format!("UDP recv failed: {}", e))),
        }
    }
}

/// Text command channel to RetroArch.
///
/// Every failure collapses into "no reply": callers treat each answer as
/// optional and never retry. A silent emulator is a steady state (paused,
/// menu open, command unsupported), not a transient error.
pub struct CommandChannel {
    transport: Box<dyn CommandTransport>,
    timeout: Duration,
}

impl CommandChannel {
    /// Connect over UDP to `address` (host:port)
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self> {
        info!("Opening RetroArch command channel to {}", address);
        let transport = UdpTransport::connect(address).await?;
        Ok(Self::with_transport(Box::new(transport), timeout))
    }

    /// Use a custom transport
    pub fn with_transport(transport: Box<dyn CommandTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a command and return the trimmed reply, if one arrived
    pub async fn send(&mut self, command: &str) -> Option<String> {
        debug!("RetroArch cmd: {}", command);

        match self.transport.request(command.as_bytes(), self.timeout).await {
            Ok(Some(bytes)) => {
                let reply = String::from_utf8_lossy(&bytes).trim().to_string();
                debug!("RetroArch reply: {}", preview(&reply, 100));
                Some(reply)
            }
            Ok(None) => {
                debug!("No reply to {} within {:?}", command, self.timeout);
                None
            }
            Err(e) => {
                debug!("Command {} failed: {}", command, e);
                None
            }
        }
    }

    /// Query and classify the emulator status
    pub async fn status(&mut self) -> EmulatorStatus {
        let reply = self.send("GET_STATUS").await;
        classify_status(reply.as_deref())
    }

    /// RetroArch version string
    pub async fn version(&mut self) -> Option<String> {
        self.send("VERSION").await
    }

    /// Pause emulation; returns the status observed afterwards
    pub async fn pause(&mut self) -> EmulatorStatus {
        self.toggle_until(EmulatorStatus::Playing, EmulatorStatus::Paused)
            .await
    }

    /// Resume emulation; returns the status observed afterwards
    pub async fn unpause(&mut self) -> EmulatorStatus {
        self.toggle_until(EmulatorStatus::Paused, EmulatorStatus::Playing)
            .await
    }

    /// `PAUSE_TOGGLE` only flips state, so it is sent only from `from`
    async fn toggle_until(&mut self, from: EmulatorStatus, to: EmulatorStatus) -> EmulatorStatus {
        let current = self.status().await;
        if current != from {
            debug!("Status is {}, not toggling", current);
            return current;
        }

        self.send("PAUSE_TOGGLE").await;
        sleep(PAUSE_SETTLE).await;

        let after = self.status().await;
        if after != to {
            debug!("Pause toggle did not reach {} (now {})", to, after);
        }
        after
    }
}

/// First `max` characters of `text`
pub(crate) fn preview(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Interactive command loop: each input line is sent as one command and
/// its reply written to `output`. Stops at `quit`, `exit` or end of input.
///
/// Returns the number of commands sent.
pub async fn command_console<R, W>(
    channel: &mut CommandChannel,
    input: R,
    output: &mut W,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let console_err = |e| RetroRlError::io("<console>", e);
    let mut lines = input.lines();
    let mut sent = 0;

    loop {
        write!(output, "Command> ").map_err(console_err)?;
        output.flush().map_err(console_err)?;

        let Some(line) = lines.next_line().await.map_err(console_err)? else {
            writeln!(output).map_err(console_err)?;
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        if command.eq_ignore_ascii_case("quit") || command.eq_ignore_ascii_case("exit") {
            break;
        }

        let reply = channel.send(command).await;
        sent += 1;
        let written = match reply {
            Some(reply) => writeln!(output, "Response: {}", reply),
            None => writeln!(output, "(no response)"),
        };
        written.map_err(console_err)?;
    }
    Ok(sent)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Answers commands from a fixed table and records what was sent
    #[derive(Clone, Default)]
    pub struct ScriptedTransport {
        replies: Arc<Mutex<HashMap<String, Vec<String>>>>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Always answer `command` with `reply`
        pub fn reply(self, command: &str, reply: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(command.to_string(), vec![reply.to_string()]);
            self
        }

        /// Answer `command` with each reply in turn, repeating the last
        pub fn replies(self, command: &str, replies: &[&str]) -> Self {
            self.replies.lock().unwrap().insert(
                command.to_string(),
                replies.iter().map(|r| r.to_string()).collect(),
            );
            self
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_count(&self, command: &str) -> usize {
            self.sent().iter().filter(|c| c.as_str() == command).count()
        }

        pub fn channel(&self) -> CommandChannel {
            CommandChannel::with_transport(Box::new(self.clone()), Duration::from_millis(10))
        }
    }

    #[async_trait]
    impl CommandTransport for ScriptedTransport {
        async fn request(&mut self, command: &[u8], _wait: Duration) -> Result<Option<Vec<u8>>> {
            let command = String::from_utf8_lossy(command).to_string();
            self.sent.lock().unwrap().push(command.clone());

            let mut replies = self.replies.lock().unwrap();
            let Some(queue) = replies.get_mut(&command) else {
                return Ok(None);
            };
            let reply = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            Ok(Some(reply.into_bytes()))
        }
    }
}
