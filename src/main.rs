use jelly_session::audio::SimulatedDevice;
use jelly_session::config::Settings;
use jelly_session::init_app_dirs;
use jelly_session::jellyfin::{JellyfinApiContract, JellyfinClient};
use jelly_session::player::{InternalPlayerStateUpdate, PlaybackSession, SessionHandle, ShuffleMode};
use jelly_session::ui::{format_time, parse_command, Cli, ControlCommand, NowPlayingDisplay};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_TARGET: &str = "jelly_session::main";
const VOLUME_STEP: f32 = 0.1;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Mirrors session updates onto the progress bar until the session closes.
async fn render_updates(handle: SessionHandle, display: Arc<NowPlayingDisplay>) {
    let mut updates = handle.subscribe();
    loop {
        match updates.recv().await {
            Ok(InternalPlayerStateUpdate::Loading { item }) => display.set_track(&item),
            Ok(InternalPlayerStateUpdate::Progress { position_seconds, duration_seconds, .. }) => {
                display.set_position(position_seconds, duration_seconds)
            }
            Ok(InternalPlayerStateUpdate::Paused { position_seconds, .. }) => {
                display.println(format!("Paused at {}", format_time(position_seconds)))
            }
            Ok(InternalPlayerStateUpdate::Stopped) => display.println("Stopped."),
            Ok(InternalPlayerStateUpdate::ModesChanged { shuffle_mode, repeat_mode }) => {
                display.println(format!("Shuffle: {:?}, repeat: {:?}", shuffle_mode, repeat_mode))
            }
            Ok(InternalPlayerStateUpdate::VolumeChanged { volume, is_muted }) => {
                display.println(format!("Volume: {}%{}", volume, if is_muted { " (muted)" } else { "" }))
            }
            Ok(InternalPlayerStateUpdate::Error(message)) => display.println(format!("Error: {}", message)),
            Ok(_) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(target: LOG_TARGET, "Display lagged behind by {} updates.", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Applies one stdin command. Returns `false` when the user asked to quit.
async fn apply_command(handle: &SessionHandle, display: &NowPlayingDisplay, command: ControlCommand) -> Result<bool, Box<dyn Error>> {
    match command {
        ControlCommand::PlayPause => handle.play_pause().await?,
        ControlCommand::Next => {
            if handle.next().await?.is_none() {
                display.println("End of queue.");
            }
        }
        ControlCommand::Previous => {
            if handle.previous().await?.is_none() {
                display.println("Start of queue.");
            }
        }
        ControlCommand::ToggleShuffle => {
            handle.toggle_shuffle_mode().await?;
        }
        ControlCommand::ToggleRepeat => {
            handle.toggle_repeat_mode().await?;
        }
        ControlCommand::VolumeUp | ControlCommand::VolumeDown => {
            let state = handle.get_state().await?;
            let step = if command == ControlCommand::VolumeUp { VOLUME_STEP } else { -VOLUME_STEP };
            handle.set_volume(f32::from(state.volume) / 100.0 + step).await?;
        }
        ControlCommand::ToggleMute => {
            let state = handle.get_state().await?;
            handle.set_muted(!state.is_muted).await?;
        }
        ControlCommand::Seek(seconds) => {
            if let Err(e) = handle.seek(seconds).await? {
                display.println(format!("Seek rejected: {}", e));
            }
        }
        ControlCommand::Stop => handle.stop().await?,
        ControlCommand::Status => {
            let state = handle.get_state().await?;
            let title = state.current_item.as_ref().map(|t| t.name.as_str()).unwrap_or("-");
            display.println(format!(
                "{:?}: {} [{} / {}] track {}/{}",
                state.status,
                title,
                format_time(state.position_seconds),
                format_time(state.duration_seconds),
                state.current_queue_index.map(|i| i + 1).unwrap_or(0),
                state.queue_ids.len()
            ));
        }
        ControlCommand::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse command-line arguments and initialize CLI
    let cli = Cli::new();
    let args = &cli.args;
    init_logging(args.json_logs);

    // Initialize application directories
    init_app_dirs()?;

    // Load configuration from file or create default
    let config_path = match &args.config {
        Some(path) => PathBuf::from(path),
        None => Settings::default_path(),
    };
    let mut settings = Settings::load(&config_path)?;

    // Command-line arguments and environment variables override the file
    if let Some(server_url) = &args.server_url {
        settings.server_url = server_url.clone();
    }
    if let Some(api_key) = &args.api_key {
        settings.api_key = Some(api_key.clone());
    }
    if let Some(user_id) = &args.user_id {
        settings.user_id = Some(user_id.clone());
    }
    settings.validate()?;

    if args.item_ids.is_empty() {
        return Err("No item IDs given; pass the tracks to play as arguments.".into());
    }

    let mut client = JellyfinClient::new(&settings.server_url);
    if let Some(api_key) = &settings.api_key {
        client = client.with_api_key(api_key);
    }
    if let Some(user_id) = &settings.user_id {
        client = client.with_user_id(user_id);
    }
    let client: Arc<dyn JellyfinApiContract> = Arc::new(client);
    info!(target: LOG_TARGET, "Connecting to {} as device '{}'.", settings.server_url, settings.device_name);

    let device = Arc::new(SimulatedDevice::new());
    let session = PlaybackSession::create(client, device, &settings.playback);
    let handle = session.handle();

    let display = Arc::new(NowPlayingDisplay::new());
    let render_task = tokio::spawn(render_updates(handle.clone(), display.clone()));
    cli.display_help(&display);

    if args.shuffle {
        handle.set_shuffle_mode(ShuffleMode::On).await?;
    }
    if let Some(repeat) = args.repeat {
        handle.set_repeat_mode(repeat.into()).await?;
    }
    handle.play_items(args.item_ids.clone(), 0).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => {
                        if !apply_command(&handle, &display, command).await? {
                            break;
                        }
                    }
                    Err(e) => display.println(format!("{} (commands: p n b s r + - m seek <secs> x i q)", e)),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(target: LOG_TARGET, "Interrupted.");
                break;
            }
        }
    }

    session.dispose().await;
    render_task.abort();
    display.finish();
    if let Err(e) = settings.save(&config_path) {
        warn!(target: LOG_TARGET, "Could not save settings to {:?}: {}", config_path, e);
    }
    Ok(())
}
