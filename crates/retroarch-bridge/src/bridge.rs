//! Vision bridge loop
//!
//! One iteration: read memory state, capture a frame, publish both, poll
//! the agent's action and press it, then sleep out the rest of the period.
//! Everything runs in sequence on one task.

use crate::capture::{FrameCapture, FrameSource};
use crate::command::CommandChannel;
use crate::exchange::ActionExchange;
use crate::input::{InputInjector, KeySink};
use crate::memory::StateReader;
use retro_rl_core::{BridgeConfig, EmulatorStatus, GameState, Result, RetroRlError};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};

/// Timings kept for progress averages
const RECENT_WINDOW: usize = 60;

/// Running timing statistics
#[derive(Debug, Clone, Default)]
pub struct LoopStats {
    frames: u64,
    capture_total: Duration,
    captures: u64,
    memory_total: Duration,
    memory_reads: u64,
    recent_capture: VecDeque<Duration>,
    recent_memory: VecDeque<Duration>,
}

impl LoopStats {
    fn push_recent(window: &mut VecDeque<Duration>, elapsed: Duration) {
        if window.len() == RECENT_WINDOW {
            window.pop_front();
        }
        window.push_back(elapsed);
    }

    pub fn record_capture(&mut self, elapsed: Duration) {
        self.capture_total += elapsed;
        self.captures += 1;
        Self::push_recent(&mut self.recent_capture, elapsed);
    }

    pub fn record_memory(&mut self, elapsed: Duration) {
        self.memory_total += elapsed;
        self.memory_reads += 1;
        Self::push_recent(&mut self.recent_memory, elapsed);
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn mean_ms(window: &VecDeque<Duration>) -> f64 {
        if window.is_empty() {
            return 0.0;
        }
        window.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0 / window.len() as f64
    }

    /// Average capture time over the last 60 captures, in ms
    pub fn recent_capture_ms(&self) -> f64 {
        Self::mean_ms(&self.recent_capture)
    }

    /// Average memory read time over the last 60 polls, in ms
    pub fn recent_memory_ms(&self) -> f64 {
        Self::mean_ms(&self.recent_memory)
    }

    pub fn summary(&self) -> LoopSummary {
        let avg = |total: Duration, n: u64| {
            if n == 0 {
                0.0
            } else {
                total.as_secs_f64() * 1000.0 / n as f64
            }
        };
        LoopSummary {
            frames: self.frames,
            avg_capture_ms: avg(self.capture_total, self.captures),
            avg_memory_ms: avg(self.memory_total, self.memory_reads),
        }
    }
}

/// Printed when the loop stops
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSummary {
    pub frames: u64,
    pub avg_capture_ms: f64,
    pub avg_memory_ms: f64,
}

impl fmt::Display for LoopSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Performance Summary:")?;
        writeln!(f, "  Avg capture time: {:.2}ms", self.avg_capture_ms)?;
        writeln!(f, "  Avg memory read:  {:.2}ms", self.avg_memory_ms)?;
        write!(f, "  Total frames: {}", self.frames)
    }
}

/// What one iteration did
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub state: GameState,
    /// Whether a frame was captured and the state file updated
    pub published: bool,
    /// Action read from the exchange
    pub action: Option<String>,
    /// Whether the action was pressed
    pub pressed: bool,
}

/// Polling bridge between RetroArch and the agent
pub struct VisionBridge {
    config: BridgeConfig,
    channel: CommandChannel,
    reader: StateReader,
    capture: FrameCapture,
    exchange: ActionExchange,
    injector: InputInjector,
    stats: LoopStats,
    last_action: Option<String>,
}

impl VisionBridge {
    pub fn new(
        config: BridgeConfig,
        channel: CommandChannel,
        source: Box<dyn FrameSource>,
        sink: Box<dyn KeySink>,
    ) -> Result<Self> {
        config.validate()?;
        let reader = StateReader::new(config.addresses, config.pacing.flag_sample_interval)?;
        let capture = FrameCapture::new(source, &config.capture);
        let exchange = ActionExchange::new(config.exchange.clone());
        let injector = InputInjector::new(sink, config.keys.clone());

        Ok(Self {
            config,
            channel,
            reader,
            capture,
            exchange,
            injector,
            stats: LoopStats::default(),
            last_action: None,
        })
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Create the exchange directory and require a running game
    pub async fn init(&mut self) -> Result<()> {
        let capture = &self.config.capture;
        info!(
            "Frame size: {}x{} {}",
            capture.width,
            capture.height,
            if capture.grayscale { "grayscale" } else { "RGB" }
        );
        info!("Frame values: {}", capture.value_count());
        info!("State file: {}", self.exchange.state_file().display());
        info!("Action file: {}", self.exchange.action_file().display());

        self.exchange.ensure_dir().await?;

        let status = self.channel.status().await;
        info!("RetroArch status: {}", status);
        if status != EmulatorStatus::Playing {
            return Err(RetroRlError::IpcError(format!(
                "game not playing (status: {}); load the game and unpause",
                status
            )));
        }
        Ok(())
    }

    /// One iteration, without pacing. Failures are logged, never returned.
    pub async fn step(&mut self) -> StepReport {
        let started = Instant::now();
        let state = self.reader.read_state(&mut self.channel).await;
        self.stats.record_memory(started.elapsed());

        let started = Instant::now();
        let frame = self.capture.capture();
        self.stats.record_capture(started.elapsed());

        let published = match frame {
            Ok(frame) => match self.exchange.publish(&state, &frame).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Error writing state: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Frame capture failed: {}", e);
                false
            }
        };

        let action = self.exchange.poll().await;
        let mut pressed = false;
        if let Some(token) = &action {
            match self.injector.press(token, self.config.pacing.hold()).await {
                Ok(true) => {
                    pressed = true;
                    self.last_action = Some(token.clone());
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to press {}: {}", token, e),
            }
        }

        StepReport {
            state,
            published,
            action,
            pressed,
        }
    }

    /// `init`, then `run`, with `shutdown` watched from the start.
    ///
    /// `shutdown` is polled before startup begins, so a signal future such
    /// as `tokio::signal::ctrl_c()` has its handler installed ahead of the
    /// first status query. Shutting down during startup yields an empty
    /// summary.
    pub async fn start<F>(&mut self, shutdown: F) -> Result<LoopSummary>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let started = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            started = self.init() => Some(started),
        };
        match started {
            Some(started) => started?,
            None => {
                info!("Stopped before the loop started");
                return Ok(self.stats.summary());
            }
        }
        Ok(self.run(shutdown).await)
    }

    /// Run until `shutdown` resolves or the iteration limit is reached.
    ///
    /// `shutdown` is only observed between iterations, so a key press is
    /// never cut off mid-hold.
    pub async fn run<F>(&mut self, shutdown: F) -> LoopSummary
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let period = self.config.pacing.period();
        let log_interval = self.config.pacing.log_interval.max(1);

        info!("Starting bridge loop (Ctrl+C to stop)");

        loop {
            if let Some(max) = self.config.pacing.max_iterations {
                if self.stats.frames >= max {
                    info!("Reached {} iterations", max);
                    break;
                }
            }

            let started = Instant::now();
            let report = self.step().await;

            if self.stats.frames % log_interval == 0 {
                self.log_progress(&report.state);
            }
            self.stats.frames += 1;

            let remaining = period.saturating_sub(started.elapsed());
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Stopping...");
                    break;
                }
                _ = sleep(remaining) => {}
            }
        }

        self.stats.summary()
    }

    fn log_progress(&self, state: &GameState) {
        info!(
            "[{:5}] Pos:({:3},{:3}) Map:{:3} Dir:{:5} | Capture:{:.1}ms Mem:{:.1}ms | Act:{}",
            self.stats.frames,
            state.x,
            state.y,
            state.map_id,
            state.direction.name(),
            self.stats.recent_capture_ms(),
            self.stats.recent_memory_ms(),
            self.last_action.as_deref().unwrap_or("-")
        );
    }
}
