//! Operator Surface
//!
//! Argument parsing and the three ways to drive the glove: one-shot
//! commands, the interactive raw-command loop, and motion-trace replay.

use crate::domain::command::Command;
use crate::domain::motion;
use crate::domain::settings::GloveSettings;
use crate::error::GloveError;
use crate::infrastructure::bluetooth::scanner;
use crate::infrastructure::bluetooth::session::SessionConfig;
use crate::infrastructure::bluetooth::{
    BtleTransport, DeviceIdentity, GloveSession, SessionState,
};
use crate::replay::ReplayEngine;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "roboglove")]
#[command(about = "Drive a BLE robotic glove and replay recorded motion traces")]
pub struct Args {
    /// Path to a JSON settings file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Connect to this device identity instead of scanning
    #[arg(long, global = true)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Scan for the glove and print its identity
    Scan {
        /// Advertised name to search for (default from settings)
        #[arg(long)]
        name: Option<String>,
    },
    /// Connect and type raw protocol commands, 'q' to quit
    Interactive,
    /// Replay a recorded motion trace at its original cadence
    Replay {
        /// CSV recording exported by the capture tool
        recording: PathBuf,
        /// Send a command every N samples (default from settings)
        #[arg(long)]
        stride: Option<usize>,
    },
    /// Drive a single servo to an angle
    Servo { index: u8, angle: i32 },
    /// Drive all five finger servos in one batch, thumb first
    Pose {
        #[arg(num_args = 5, value_name = "ANGLE")]
        angles: Vec<i32>,
    },
    /// Set the status LED color
    Rgb { red: i32, green: i32, blue: i32 },
    /// Switch the buzzer
    Buzzer {
        #[arg(value_enum)]
        state: BuzzerState,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum BuzzerState {
    On,
    Off,
}

pub async fn run(
    args: Args,
    settings: GloveSettings,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    match args.command {
        CliCommand::Scan { name } => run_scan(name, &settings).await,
        CliCommand::Interactive => run_interactive(args.device, &settings, cancel).await,
        CliCommand::Replay { recording, stride } => {
            run_replay(args.device, &settings, recording, stride, cancel).await
        }
        CliCommand::Servo { index, angle } => {
            run_single(args.device, &settings, Command::SetServo { index, angle }).await
        }
        CliCommand::Pose { angles } => {
            run_single(args.device, &settings, Command::SetAllServos { angles }).await
        }
        CliCommand::Rgb { red, green, blue } => {
            run_single(args.device, &settings, Command::SetRgb { red, green, blue }).await
        }
        CliCommand::Buzzer { state } => {
            let command = match state {
                BuzzerState::On => Command::BuzzerOn,
                BuzzerState::Off => Command::BuzzerOff,
            };
            run_single(args.device, &settings, command).await
        }
    }
}

async fn run_scan(name: Option<String>, settings: &GloveSettings) -> anyhow::Result<()> {
    let transport = BtleTransport::new().await?;
    let name = name.unwrap_or_else(|| settings.device_name.clone());
    let timeout = Duration::from_secs(settings.scan_timeout_secs);
    match scanner::discover_by_name(&transport, &name, timeout).await? {
        Some(identity) => {
            println!("{}", identity);
            Ok(())
        }
        None => Err(GloveError::DiscoveryTimeout {
            name,
            timeout_secs: settings.scan_timeout_secs,
        }
        .into()),
    }
}

/// Discover (or take the override), connect, and hand back a ready session.
async fn connect_session(
    device: Option<String>,
    settings: &GloveSettings,
) -> anyhow::Result<GloveSession<BtleTransport>> {
    let transport = BtleTransport::new().await?;
    let identity = match device {
        Some(id) => DeviceIdentity::new(id),
        None => scanner::discover_or_fallback(&transport, settings).await?,
    };
    let mut session = GloveSession::new(transport, SessionConfig::from(settings));
    session.connect(&identity).await?;
    Ok(session)
}

/// Connect, send one command, disconnect.
async fn run_single(
    device: Option<String>,
    settings: &GloveSettings,
    command: Command,
) -> anyhow::Result<()> {
    let mut session = connect_session(device, settings).await?;
    let sent = session.send(&command).await;
    let closed = session.disconnect().await;
    sent?;
    closed?;
    Ok(())
}

async fn run_interactive(
    device: Option<String>,
    settings: &GloveSettings,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut session = connect_session(device, settings).await?;
    if let SessionState::Degraded(reason) = session.state() {
        eprintln!("Note: {}; responses will not be shown.", reason);
    }
    println!("Type a command character and value (e.g. A90), or 'q' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if cancel.is_cancelled() {
            break;
        }
        print!("Command: ");
        std::io::stdout().flush()?;

        let Some(line) = next_line(&mut lines, &cancel).await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("q") {
            break;
        }

        if let Err(e) = session.send(&Command::Raw(line.to_string())).await {
            eprintln!("send failed: {}", e);
            continue;
        }

        // Give the device a moment to respond before reading back.
        tokio::time::sleep(Duration::from_millis(settings.response_settle_ms)).await;
        match session.receive().await {
            Ok(Some(response)) if response.lossy => {
                println!("Received (lossy): {}", response.text)
            }
            Ok(Some(response)) => println!("Received: {}", response.text),
            Ok(None) => {}
            Err(e) => eprintln!("read failed: {}", e),
        }
    }

    session.disconnect().await?;
    Ok(())
}

async fn run_replay(
    device: Option<String>,
    settings: &GloveSettings,
    recording: PathBuf,
    stride: Option<usize>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let samples = motion::load_recording(&recording)?;
    println!(
        "Loaded {} samples from {}",
        samples.len(),
        recording.display()
    );

    let engine = ReplayEngine::new(stride.unwrap_or(settings.replay_stride))?;
    let mut session = connect_session(device, settings).await?;

    println!("Press Enter to begin the movement sequence...");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if next_line(&mut lines, &cancel).await?.is_none() && !cancel.is_cancelled() {
        // stdin closed before confirmation; treat like an abort
        session.disconnect().await?;
        return Ok(());
    }

    let outcome = engine.run(&mut session, &samples, &cancel).await;
    // Always attempt the clean disconnect, even after a failed run.
    if let Err(e) = session.disconnect().await {
        warn!("disconnect after replay failed: {}", e);
    }
    let summary = outcome?;

    if summary.aborted {
        println!(
            "Replay aborted after {} command(s), {:.2} s of recording covered.",
            summary.commands_sent, summary.total_elapsed
        );
    } else {
        println!(
            "Replay finished: {} command(s) over {:.2} s of recording.",
            summary.commands_sent, summary.total_elapsed
        );
    }
    Ok(())
}

/// Read one line, returning `None` on EOF or cancellation.
async fn next_line(
    lines: &mut Lines<BufReader<Stdin>>,
    cancel: &CancellationToken,
) -> std::io::Result<Option<String>> {
    tokio::select! {
        line = lines.next_line() => line,
        _ = cancel.cancelled() => Ok(None),
    }
}
