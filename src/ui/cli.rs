//! Command-line interface implementation

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::error::Error;

use crate::jellyfin::models::Track;
use crate::player::{PlaybackStatus, RepeatMode};

/// Command-line arguments for jelly-session
#[derive(Parser, Debug)]
#[command(author, version, about = "Headless Jellyfin playback session", long_about = None)]
pub struct Args {
    /// Jellyfin server URL
    #[arg(short, long, env = "JELLYFIN_URL")]
    pub server_url: Option<String>,

    /// Jellyfin API key
    #[arg(short, long, env = "JELLYFIN_API_KEY")]
    pub api_key: Option<String>,

    /// Jellyfin user ID
    #[arg(short, long, env = "JELLYFIN_USER_ID")]
    pub user_id: Option<String>,

    /// Config file path
    #[arg(short, long, env = "JELLY_SESSION_CONFIG")]
    pub config: Option<String>,

    /// Start with shuffle on
    #[arg(long)]
    pub shuffle: bool,

    /// Initial repeat mode
    #[arg(long, value_enum)]
    pub repeat: Option<RepeatArg>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Item IDs to queue, in play order
    pub item_ids: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatArg {
    Off,
    All,
    One,
}

impl From<RepeatArg> for RepeatMode {
    fn from(arg: RepeatArg) -> Self {
        match arg {
            RepeatArg::Off => RepeatMode::Off,
            RepeatArg::All => RepeatMode::All,
            RepeatArg::One => RepeatMode::One,
        }
    }
}

/// One line typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    PlayPause,
    Next,
    Previous,
    ToggleShuffle,
    ToggleRepeat,
    VolumeUp,
    VolumeDown,
    ToggleMute,
    Seek(f64),
    Stop,
    Status,
    Quit,
}

/// Parses a stdin line into a command.
pub fn parse_command(line: &str) -> Result<ControlCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Err("empty command".to_string());
    };
    let command = match head.to_lowercase().as_str() {
        "p" | "play" | "pause" => ControlCommand::PlayPause,
        "n" | "next" => ControlCommand::Next,
        "b" | "prev" | "previous" => ControlCommand::Previous,
        "s" | "shuffle" => ControlCommand::ToggleShuffle,
        "r" | "repeat" => ControlCommand::ToggleRepeat,
        "+" => ControlCommand::VolumeUp,
        "-" => ControlCommand::VolumeDown,
        "m" | "mute" => ControlCommand::ToggleMute,
        "x" | "stop" => ControlCommand::Stop,
        "i" | "status" => ControlCommand::Status,
        "q" | "quit" => ControlCommand::Quit,
        "seek" => {
            let arg = parts.next().ok_or_else(|| "seek needs a position in seconds".to_string())?;
            let seconds = arg
                .parse::<f64>()
                .map_err(|e| format!("invalid seek position '{}': {}", arg, e))?;
            ControlCommand::Seek(seconds)
        }
        other => return Err(format!("unknown command '{}'", other)),
    };
    if parts.next().is_some() {
        return Err(format!("unexpected arguments after '{}'", head));
    }
    Ok(command)
}

/// Formats seconds as `m:ss`.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Progress bar showing the current track and position.
pub struct NowPlayingDisplay {
    bar: ProgressBar,
}

impl NowPlayingDisplay {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// Display that draws nowhere.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::with_template("{msg}\n[{bar:40.cyan/blue}] {prefix}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        NowPlayingDisplay { bar }
    }

    pub fn set_track(&self, track: &Track) {
        let title = match track.display_artist() {
            Some(artist) => format!("{} - {}", artist, track.name),
            None => track.name.clone(),
        };
        self.bar.set_message(title);
        self.set_position(0.0, track.duration_seconds());
    }

    pub fn set_position(&self, position_seconds: f64, duration_seconds: f64) {
        self.bar.set_length(duration_seconds.max(0.0) as u64);
        self.bar.set_position(position_seconds.max(0.0) as u64);
        self.bar.set_prefix(format!("{} / {}", format_time(position_seconds), format_time(duration_seconds)));
    }

    pub fn set_status(&self, status: &PlaybackStatus) {
        match status {
            PlaybackStatus::Error(message) => self.bar.println(format!("Error: {}", message)),
            PlaybackStatus::Stopped => self.bar.println("Stopped."),
            _ => {}
        }
    }

    pub fn println(&self, line: impl AsRef<str>) {
        self.bar.println(line);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for NowPlayingDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI user interface for interacting with the application
pub struct Cli {
    pub args: Args,
}

impl Cli {
    /// Create a new CLI instance
    pub fn new() -> Self {
        Cli { args: Args::parse() }
    }

    /// Prints the control keys.
    pub fn display_help(&self, display: &NowPlayingDisplay) {
        display.println("Commands: [p]lay/pause  [n]ext  [b]ack  [s]huffle  [r]epeat  +/- volume  [m]ute  seek <secs>  [x] stop  [i]nfo  [q]uit");
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
