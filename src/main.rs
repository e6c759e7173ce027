use r_alertsound::audio::{AlsaDeviceEnumerator, AlsaDriver, DeviceRegistry};
use r_alertsound::catalog::{AssetCatalog, DirectoryAssetProvider};
use r_alertsound::config::Settings;
use r_alertsound::init_app_dirs;
use r_alertsound::scheduler::AlertScheduler;
use r_alertsound::ui::{Cli, ConsoleCommand};
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "r_alertsound=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse command-line arguments and initialize CLI
    let cli = Cli::new();
    let args = &cli.args;

    init_app_dirs()?;

    let config_path = args.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load(&config_path)?;

    // Command-line arguments (or their env vars) win over the config file
    if let Some(dir) = &args.sound_dir {
        settings.sound_directory = dir.clone();
    }
    if let Some(device) = &args.device {
        settings.output_device = Some(device.clone());
    }
    if let Some(capacity) = args.queue_capacity {
        settings.queue_capacity = capacity;
    }
    settings.validate()?;
    info!(config = %config_path.display(), sounds = %settings.sound_directory.display(), "Settings loaded.");

    let devices = Arc::new(DeviceRegistry::new());
    let enumerator = AlsaDeviceEnumerator::new();
    if let Err(e) = devices.refresh(&enumerator).await {
        warn!("Device enumeration failed, only the platform default is available: {}", e);
    }

    let catalog = Arc::new(AssetCatalog::new());
    let provider = DirectoryAssetProvider::new(settings.category_files());
    match catalog.reload(&provider, &settings.sound_directory).await {
        Ok(count) => info!(count, "Sound catalog loaded."),
        Err(e) => warn!("Sound catalog could not be loaded: {}", e),
    }

    let scheduler = AlertScheduler::new(
        settings.clone(),
        Arc::clone(&catalog),
        Arc::clone(&devices),
        Arc::new(AlsaDriver::new()),
    )?;

    if let Some(name) = &settings.output_device {
        match devices.find(name) {
            Some(device) => scheduler.select_device(device).await?,
            None => warn!(device = %name, "Configured output device not found, using platform default."),
        }
    }

    cli.display_help();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        cli.prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        let result: Result<(), Box<dyn Error>> = match command {
            ConsoleCommand::Notify(category) => scheduler
                .notify(category, CancellationToken::new())
                .map(|id| println!("Queued {} alert ({})", category, id))
                .map_err(Into::into),
            ConsoleCommand::StopAll => scheduler.stop_all().await.map_err(Into::into),
            ConsoleCommand::Clear(category) => {
                let removed = scheduler.clear_category(category);
                println!("Removed {} pending {} alert(s)", removed, category);
                Ok(())
            }
            ConsoleCommand::Status => {
                cli.display_status(&scheduler.status());
                Ok(())
            }
            ConsoleCommand::Devices => {
                match devices.refresh(&enumerator).await {
                    Ok(_) => cli.display_devices(&devices.list_devices(), devices.selected().as_ref()),
                    Err(e) => cli.display_error(&e),
                }
                Ok(())
            }
            ConsoleCommand::Select(index) => match devices.list_devices().get(index - 1).cloned() {
                Some(device) => scheduler.select_device(device).await.map_err(Into::into),
                None => Err(format!("no device #{} (use 'd' to list devices)", index).into()),
            },
            ConsoleCommand::DefaultDevice => scheduler.reset_device().await.map_err(Into::into),
            ConsoleCommand::Capacity(capacity) => scheduler.set_capacity(capacity).map_err(Into::into),
            ConsoleCommand::Reload => catalog
                .reload(&provider, &settings.sound_directory)
                .await
                .map(|count| println!("Loaded {} sound(s)", count))
                .map_err(Into::into),
            ConsoleCommand::Assets => {
                cli.display_assets(&catalog.assets());
                Ok(())
            }
            ConsoleCommand::Help => {
                cli.display_help();
                Ok(())
            }
            ConsoleCommand::Quit => break,
        };

        if let Err(e) = result {
            cli.display_error(&*e);
        }
    }

    info!("Shutting down.");
    scheduler.stop_all().await?;
    Ok(())
}
