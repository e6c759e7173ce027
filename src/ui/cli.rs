//! Command-line interface implementation

use clap::Parser;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;

use crate::audio::AudioDeviceDescriptor;
use crate::catalog::{SoundAsset, SoundCategory};
use crate::scheduler::SchedulerStatus;

/// Command-line arguments for r-alertsound
#[derive(Parser, Debug)]
#[command(author, version, about = "Alert sound scheduler console", long_about = None)]
pub struct Args {
    /// Directory containing the alert sound files
    #[arg(short, long, env = "ALERTSOUND_DIR")]
    pub sound_dir: Option<PathBuf>,

    /// Output device name (as listed by the `d` command)
    #[arg(short = 'd', long, env = "ALERTSOUND_DEVICE")]
    pub device: Option<String>,

    /// Maximum number of pending alerts
    #[arg(short = 'n', long, env = "ALERTSOUND_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Config file path
    #[arg(short, long, env = "ALERTSOUND_CONFIG")]
    pub config: Option<PathBuf>,
}

/// One line typed at the operator console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Notify(SoundCategory),
    StopAll,
    Clear(SoundCategory),
    Status,
    Devices,
    /// 1-based index into the device listing
    Select(usize),
    DefaultDevice,
    Capacity(usize),
    Reload,
    Assets,
    Help,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or_else(|| "empty command".to_string())?.to_lowercase();
        let argument = parts.next();
        if parts.next().is_some() {
            return Err(format!("too many arguments for '{}'", command));
        }

        let number = |what: &str| -> Result<usize, String> {
            let raw = argument.ok_or_else(|| format!("'{}' needs a {}", command, what))?;
            raw.parse::<usize>().map_err(|_| format!("'{}' is not a valid {}", raw, what))
        };

        match command.as_str() {
            "i" | "intrusion" => Ok(ConsoleCommand::Notify(SoundCategory::Intrusion)),
            "f" | "fault" => Ok(ConsoleCommand::Notify(SoundCategory::Fault)),
            "a" | "action" => Ok(ConsoleCommand::Notify(SoundCategory::Action)),
            "s" | "stop" => Ok(ConsoleCommand::StopAll),
            "c" | "clear" => {
                let category = argument.ok_or_else(|| "'clear' needs a category".to_string())?;
                Ok(ConsoleCommand::Clear(category.parse()?))
            }
            "st" | "status" => Ok(ConsoleCommand::Status),
            "d" | "devices" => Ok(ConsoleCommand::Devices),
            "sel" | "select" => match number("device number")? {
                0 => Err("device numbers start at 1".to_string()),
                n => Ok(ConsoleCommand::Select(n)),
            },
            "def" | "default" => Ok(ConsoleCommand::DefaultDevice),
            "cap" | "capacity" => Ok(ConsoleCommand::Capacity(number("capacity")?)),
            "r" | "reload" => Ok(ConsoleCommand::Reload),
            "l" | "list" => Ok(ConsoleCommand::Assets),
            "h" | "help" | "?" => Ok(ConsoleCommand::Help),
            "q" | "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(format!("unknown command '{}' (type 'h' for help)", other)),
        }
    }
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Cli {
    /// Create a new CLI instance
    pub fn new() -> Self {
        Cli {
            args: Args::parse(),
        }
    }

    pub fn prompt(&self) -> io::Result<()> {
        print!("alert> ");
        io::stdout().flush()
    }

    pub fn display_help(&self) {
        println!("\nCommands:");
        println!("  i | f | a        raise an intrusion, fault or action-report alert");
        println!("  s                stop all playback and clear pending alerts");
        println!("  c <category>     drop pending alerts of a category");
        println!("  st               show queue and playback status");
        println!("  d                list output devices");
        println!("  sel <n> | def    select device n, or revert to the default");
        println!("  cap <n>          set the queue capacity");
        println!("  r | l            reload or list the sound catalog");
        println!("  q                quit\n");
    }

    /// Display the queue and the active session
    pub fn display_status(&self, status: &SchedulerStatus) {
        let queue = &status.queue;
        println!(
            "\nQueue: {}/{} ({})",
            queue.length,
            queue.capacity,
            if queue.processing { "processing" } else { "idle" }
        );
        match &status.playing {
            Some(active) => {
                let elapsed = SystemTime::now()
                    .duration_since(active.started_at)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0);
                println!(
                    "Playing: {} [{}] {:?} for {:.1}s (id {})",
                    active.asset_name, active.category, active.strategy, elapsed, active.correlation_id
                );
            }
            None => println!("Playing: nothing"),
        }

        if !queue.items.is_empty() {
            println!("{:<5} {:<20} {:<10} {:<9} {}", "#", "Name", "Category", "Priority", "ID");
            println!("{}", "-".repeat(60));
            for (index, item) in queue.items.iter().enumerate() {
                println!(
                    "{:<5} {:<20} {:<10} {:<9} {}",
                    index + 1,
                    truncate(&item.asset_name, 18),
                    item.category,
                    item.priority,
                    item.correlation_id
                );
            }
        }
        println!();
    }

    /// Display the enumerated output devices, marking the selected one
    pub fn display_devices(&self, devices: &[AudioDeviceDescriptor], selected: Option<&AudioDeviceDescriptor>) {
        println!("\nOutput devices:");
        println!("{:<5} {:<30} {:<16} {}", "#", "Name", "Transport", "ID");
        println!("{}", "-".repeat(70));
        for (index, device) in devices.iter().enumerate() {
            let marker = if selected.map_or(false, |s| s.name == device.name) { "*" } else { " " };
            println!(
                "{}{:<4} {:<30} {:<16} {}",
                marker,
                index + 1,
                truncate(&device.name, 28),
                device.transport.to_string(),
                device.native_id
            );
        }
        if selected.is_none() {
            println!("(using platform default)");
        }
        println!();
    }

    pub fn display_assets(&self, assets: &[std::sync::Arc<SoundAsset>]) {
        println!("\nSound catalog:");
        for asset in assets {
            println!(
                "  {:<20} {:<10} {}{}",
                truncate(asset.name(), 18),
                asset.category(),
                asset.path().display(),
                if asset.is_playing() { " (playing)" } else { "" }
            );
        }
        println!();
    }

    /// Display error messages
    pub fn display_error(&self, error: &dyn Error) {
        eprintln!("Error: {}", error);
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(name: &str, max: usize) -> String {
    if name.chars().count() > max {
        let head: String = name.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}
