//! retro-rl command line
//!
//! Runs the RetroArch vision bridge and the tools used to set it up:
//! command discovery, raw commands, status/pause control, memory state
//! dumps, key press and input checks, capture benchmarking and checkpoint
//! reset.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use retro_rl_core::{BridgeConfig, Button, CaptureRegion, EmulatorStatus, ExchangeConfig, KeyMap};
use retroarch_bridge::{
    CATALOGUE, CommandChannel, DISCOVERY_TIMEOUT, DryRunKeySink, FrameCapture, FrameProcessor,
    InputCheck, InputInjector, KeySink, StateReader, VisionBridge, command_console, discover,
    keyboard_sink, reset_checkpoints, save_preview, screen_source,
};
use std::hint::black_box;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "retro-rl", version)]
#[command(about = "Bridge between a learning agent and Pokemon FireRed running in RetroArch")]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// RetroArch network command host
    #[arg(long, global = true)]
    host: Option<String>,

    /// RetroArch network command port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Reply timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Screen region as LEFT,TOP,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_region)]
    region: Option<CaptureRegion>,

    /// Frame size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Single-channel frames
    #[arg(long)]
    grayscale: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge loop until Ctrl+C
    Bridge {
        /// Directory for game_state.json and action.json
        #[arg(long)]
        dir: Option<PathBuf>,

        #[command(flatten)]
        capture: CaptureArgs,

        /// Stop after this many iterations
        #[arg(long)]
        frames: Option<u64>,

        /// Log key presses instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Find which network commands this RetroArch answers
    Discover,
    /// Send one raw command and print the reply
    Send {
        #[arg(required_unless_present = "repl", num_args = 1..)]
        command: Vec<String>,

        /// Read commands from stdin, one per line, until `quit`
        #[arg(long, conflicts_with = "command")]
        repl: bool,
    },
    /// Show emulator status and version
    Status,
    /// Read and print the game state from memory
    State {
        /// Number of reads
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Delay between reads in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
    /// Pause emulation
    Pause,
    /// Resume emulation
    Unpause,
    /// Press a button through the host keyboard
    Press {
        /// UP, DOWN, LEFT, RIGHT, A, B, START, SELECT, L or R
        button: Button,

        #[arg(long, default_value_t = 80)]
        hold_ms: u64,

        /// Seconds to wait first, to focus the RetroArch window
        #[arg(long, default_value_t = 0)]
        delay_s: u64,

        /// Log key presses instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Press a button a few times and check that the player moved
    TestInput {
        /// Button to press
        #[arg(long, default_value = "DOWN")]
        button: Button,

        #[arg(long, default_value_t = 5)]
        presses: u32,

        #[arg(long, default_value_t = 150)]
        hold_ms: u64,

        /// Pause between presses in milliseconds
        #[arg(long, default_value_t = 50)]
        gap_ms: u64,

        /// Seconds to wait first, to focus the RetroArch window
        #[arg(long, default_value_t = 3)]
        delay_s: u64,

        /// Log key presses instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Benchmark screen capture and downsampling, save a preview PNG
    Capture {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Frames to grab
        #[arg(long, default_value_t = 100)]
        frames: u32,

        /// Where to save calibration_test.png
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Reset the model checkpoint and battle transition files
    Reset {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn parse_region(value: &str) -> std::result::Result<CaptureRegion, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [left, top, width, height] = parts.as_slice() else {
        return Err("expected LEFT,TOP,WIDTH,HEIGHT".to_string());
    };
    let region = CaptureRegion {
        left: left.parse().map_err(|e| format!("left: {}", e))?,
        top: top.parse().map_err(|e| format!("top: {}", e))?,
        width: width.parse().map_err(|e| format!("width: {}", e))?,
        height: height.parse().map_err(|e| format!("height: {}", e))?,
    };
    if region.width == 0 || region.height == 0 {
        return Err("region must be non-empty".to_string());
    }
    Ok(region)
}

fn parse_size(value: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let w: u32 = w.trim().parse().map_err(|e| format!("width: {}", e))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("height: {}", e))?;
    if w == 0 || h == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((w, h))
}

/// Defaults, then the config file, then global flags
fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = match &cli.config {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.emulator.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.emulator.port = port;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.emulator.timeout_ms = timeout_ms;
    }
    Ok(config)
}

fn apply_capture_args(config: &mut BridgeConfig, args: &CaptureArgs) {
    if let Some(region) = args.region {
        config.capture.region = region;
    }
    if let Some((width, height)) = args.size {
        config.capture.width = width;
        config.capture.height = height;
    }
    if args.grayscale {
        config.capture.grayscale = true;
    }
}

async fn connect(config: &BridgeConfig) -> Result<CommandChannel> {
    Ok(CommandChannel::connect(&config.emulator.address(), config.emulator.timeout()).await?)
}

fn key_sink(dry_run: bool) -> Result<Box<dyn KeySink>> {
    if dry_run {
        info!("Dry run: key presses are logged, not sent");
        return Ok(Box::new(DryRunKeySink::new()));
    }
    Ok(keyboard_sink()?)
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_bridge(
    mut config: BridgeConfig,
    dir: Option<PathBuf>,
    capture: &CaptureArgs,
    frames: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    if let Some(dir) = dir {
        config.exchange = ExchangeConfig::in_dir(dir);
    }
    apply_capture_args(&mut config, capture);
    if frames.is_some() {
        config.pacing.max_iterations = frames;
    }
    config.validate()?;

    println!("{}", "=".repeat(60));
    println!("RetroArch Vision Bridge");
    println!("{}", "=".repeat(60));

    let source = screen_source()?;
    let sink = key_sink(dry_run)?;
    let channel = connect(&config).await?;

    let mut bridge = VisionBridge::new(config, channel, source, sink)?;
    let summary = bridge.start(ctrl_c()).await?;
    println!("\n{}", summary);
    Ok(())
}

async fn run_state(config: &BridgeConfig, count: u32, interval: Duration) -> Result<()> {
    let mut channel = connect(config).await?;
    // Sample the flags on every read
    let mut reader = StateReader::new(config.addresses, 1)?;

    for i in 0..count {
        if i > 0 {
            sleep(interval).await;
        }
        let state = reader.read_state(&mut channel).await;
        println!(
            "Pos:({:3},{:3}) Map:{:3} Dir:{:5} Battle:{} Menu:{} | vector {:?}",
            state.x,
            state.y,
            state.map_id,
            state.direction.name(),
            state.in_battle,
            state.menu_flag,
            state.to_vector()
        );
    }
    Ok(())
}

async fn run_press(
    config: &BridgeConfig,
    button: Button,
    hold: Duration,
    delay_s: u64,
    dry_run: bool,
) -> Result<()> {
    let mut injector = InputInjector::new(key_sink(dry_run)?, config.keys.clone());

    for remaining in (1..=delay_s).rev() {
        println!("Pressing {} in {}... (focus the RetroArch window)", button, remaining);
        sleep(Duration::from_secs(1)).await;
    }

    if injector.press_button(button, hold).await? {
        println!("Pressed {} for {}ms", button, hold.as_millis());
    } else {
        bail!("no key is bound to {}", button);
    }
    Ok(())
}

fn print_key_map(keys: &KeyMap) {
    println!("Key map (must match RetroArch Settings > Input > Port 1 Controls):");
    for (button, key) in keys.iter() {
        println!("  {:6} -> {}", button.name(), key);
    }
}

async fn run_test_input(
    config: &BridgeConfig,
    check: InputCheck,
    delay_s: u64,
    dry_run: bool,
) -> Result<()> {
    let mut channel = connect(config).await?;
    match channel.status().await {
        EmulatorStatus::Playing => {}
        EmulatorStatus::Paused => bail!("RetroArch is paused; unpause it first"),
        status => warn!("RetroArch status is {}; the game may not react", status),
    }

    let mut injector = InputInjector::new(key_sink(dry_run)?, config.keys.clone());
    print_key_map(injector.keys());

    let mut reader = StateReader::new(config.addresses, 1)?;
    let before = reader.read_state(&mut channel).await;
    println!(
        "\nBefore: pos ({}, {}) map {} facing {}",
        before.x,
        before.y,
        before.map_id,
        before.direction.name()
    );

    for remaining in (1..=delay_s).rev() {
        println!("Focus the RetroArch window... {}", remaining);
        sleep(Duration::from_secs(1)).await;
    }

    let report = check
        .run(&mut channel, &mut reader, &mut injector, before)
        .await?;
    println!("\n{}", report);
    Ok(())
}

fn run_capture(
    mut config: BridgeConfig,
    capture: &CaptureArgs,
    frames: u32,
    dir: Option<PathBuf>,
) -> Result<()> {
    apply_capture_args(&mut config, capture);
    config.validate()?;
    let frames = frames.max(1);

    let mut capture = FrameCapture::new(screen_source()?, &config.capture);
    let region = capture.region();
    println!(
        "Capturing region {}x{} at ({}, {})",
        region.width, region.height, region.left, region.top
    );

    let start = Instant::now();
    let mut raw = capture.grab()?;
    for _ in 1..frames {
        raw = capture.grab()?;
    }
    let elapsed = start.elapsed().as_secs_f64();
    println!("  Captured {} frames in {:.2}s", frames, elapsed);
    println!("  Speed: {:.1} FPS", frames as f64 / elapsed.max(f64::EPSILON));

    println!("\nDownsampling ({}x{} source):", raw.width, raw.height);
    for (width, height, name) in [
        (240, 160, "Native GBA"),
        (120, 80, "Half"),
        (60, 40, "Quarter"),
        (48, 32, "Tiny"),
    ] {
        let processor = FrameProcessor::new(width, height, config.capture.grayscale);
        let start = Instant::now();
        for _ in 0..1000 {
            black_box(processor.process(black_box(&raw)));
        }
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "  {:12} ({}x{}): {:.0} FPS, {} values",
            name,
            width,
            height,
            1000.0 / elapsed.max(f64::EPSILON),
            width as usize * height as usize * config.capture.channels() as usize
        );
    }

    let frame = capture.processor().process(&raw);
    let dir = dir.unwrap_or_else(|| config.exchange.base_dir());
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("calibration_test.png");
    save_preview(&frame, &path)?;
    println!("\nSaved {}x{} preview to {}", frame.width, frame.height, path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;

    match &cli.command {
        Command::Bridge {
            dir,
            capture,
            frames,
            dry_run,
        } => run_bridge(config, dir.clone(), capture, *frames, *dry_run).await?,
        Command::Discover => {
            let mut channel =
                CommandChannel::connect(&config.emulator.address(), DISCOVERY_TIMEOUT).await?;
            let report = discover(&mut channel, CATALOGUE).await;
            println!("{}", report);
            if !report.connected {
                bail!("RetroArch did not answer on {}", config.emulator.address());
            }
        }
        Command::Send { command, repl } => {
            let mut channel = connect(&config).await?;
            if *repl {
                println!("Type a command, or 'quit' to exit");
                let stdin = tokio::io::BufReader::new(tokio::io::stdin());
                command_console(&mut channel, stdin, &mut std::io::stdout()).await?;
            } else {
                let command = command.join(" ");
                match channel.send(&command).await {
                    Some(reply) => println!("{}", reply),
                    None => println!("(no response)"),
                }
            }
        }
        Command::Status => {
            let mut channel = connect(&config).await?;
            let status = channel.status().await;
            let version = channel.version().await;
            println!("Status:  {}", status);
            println!("Version: {}", version.as_deref().unwrap_or("(no response)"));
        }
        Command::State { count, interval_ms } => {
            run_state(&config, *count, Duration::from_millis(*interval_ms)).await?
        }
        Command::Pause => {
            let mut channel = connect(&config).await?;
            println!("Status: {}", channel.pause().await);
        }
        Command::Unpause => {
            let mut channel = connect(&config).await?;
            println!("Status: {}", channel.unpause().await);
        }
        Command::Press {
            button,
            hold_ms,
            delay_s,
            dry_run,
        } => {
            run_press(
                &config,
                *button,
                Duration::from_millis(*hold_ms),
                *delay_s,
                *dry_run,
            )
            .await?
        }
        Command::TestInput {
            button,
            presses,
            hold_ms,
            gap_ms,
            delay_s,
            dry_run,
        } => {
            let check = InputCheck {
                button: *button,
                presses: *presses,
                hold: Duration::from_millis(*hold_ms),
                gap: Duration::from_millis(*gap_ms),
                ..Default::default()
            };
            run_test_input(&config, check, *delay_s, *dry_run).await?
        }
        Command::Capture {
            capture,
            frames,
            dir,
        } => run_capture(config, capture, *frames, dir.clone())?,
        Command::Reset { dir } => {
            let dir = dir.clone().unwrap_or_else(|| config.exchange.base_dir());
            let outcome = reset_checkpoints(&dir).await?;
            println!("{}", outcome);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_region() {
        assert_eq!(
            parse_region("6,71,705,456").unwrap(),
            CaptureRegion {
                left: 6,
                top: 71,
                width: 705,
                height: 456
            }
        );
        assert_eq!(parse_region("-10, 0, 240, 160").unwrap().left, -10);
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("0,0,0,160").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("60x40").unwrap(), (60, 40));
        assert_eq!(parse_size("240X160").unwrap(), (240, 160));
        assert!(parse_size("60").is_err());
        assert!(parse_size("0x40").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "retro-rl",
            "--port",
            "55400",
            "--timeout-ms",
            "250",
            "bridge",
            "--size",
            "48x32",
            "--grayscale",
        ]);
        let mut config = load_config(&cli).unwrap();
        assert_eq!(config.emulator.port, 55400);
        assert_eq!(config.emulator.timeout_ms, 250);
        assert_eq!(config.emulator.host, "127.0.0.1");

        let Command::Bridge { capture, .. } = &cli.command else {
            panic!("expected bridge");
        };
        apply_capture_args(&mut config, capture);
        assert_eq!((config.capture.width, config.capture.height), (48, 32));
        assert!(config.capture.grayscale);
        assert_eq!(config.capture.region, CaptureRegion::default());
    }

    #[test]
    fn test_press_parses_button() {
        let cli = Cli::parse_from(["retro-rl", "press", "start", "--hold-ms", "100"]);
        let Command::Press { button, hold_ms, .. } = cli.command else {
            panic!("expected press");
        };
        assert_eq!(button, Button::Start);
        assert_eq!(hold_ms, 100);
    }

    #[test]
    fn test_input_check_defaults() {
        let cli = Cli::parse_from(["retro-rl", "test-input", "--dry-run"]);
        let Command::TestInput {
            button,
            presses,
            hold_ms,
            gap_ms,
            delay_s,
            dry_run,
        } = cli.command
        else {
            panic!("expected test-input");
        };
        assert_eq!(button, Button::Down);
        assert_eq!((presses, hold_ms, gap_ms, delay_s), (5, 150, 50, 3));
        assert!(dry_run);
    }

    #[test]
    fn test_send_takes_command_or_repl() {
        let cli = Cli::parse_from(["retro-rl", "send", "READ_CORE_MEMORY", "02036E48", "1"]);
        let Command::Send { command, repl } = cli.command else {
            panic!("expected send");
        };
        assert_eq!(command.join(" "), "READ_CORE_MEMORY 02036E48 1");
        assert!(!repl);

        let cli = Cli::parse_from(["retro-rl", "send", "--repl"]);
        assert!(matches!(cli.command, Command::Send { repl: true, .. }));

        assert!(Cli::try_parse_from(["retro-rl", "send"]).is_err());
        assert!(Cli::try_parse_from(["retro-rl", "send", "--repl", "VERSION"]).is_err());
    }
}
