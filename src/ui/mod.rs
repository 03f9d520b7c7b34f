//! Terminal front end: arguments, stdin commands and the now-playing line

mod cli;

pub use cli::{format_time, parse_command, Args, Cli, ControlCommand, NowPlayingDisplay, RepeatArg};
