//! Interactive operator console

use crate::orchestrator::{Orchestrator, SystemStatus};
use crate::stream::StreamHealth;
use std::fmt::Write as _;
use std::str::FromStr;
use thiserror::Error;

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Pause,
    Resume,
    /// Force a screening cycle now
    Screen,
    Watchlist,
    Clear,
    Add(String),
    Remove(String),
    /// Per-stream health
    Live,
    /// Switch live streaming on for the watchlist
    StartLive,
    /// Stop all live streams until started again
    StopLive,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Usage: {0} SYMBOL")]
    MissingSymbol(&'static str),
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Err(ConsoleError::Empty);
        };
        let arg = parts.next();

        let command = match word.to_lowercase().as_str() {
            "status" => ConsoleCommand::Status,
            "pause" => ConsoleCommand::Pause,
            "resume" => ConsoleCommand::Resume,
            "screen" => ConsoleCommand::Screen,
            "watchlist" => ConsoleCommand::Watchlist,
            "clear" => ConsoleCommand::Clear,
            "live" => ConsoleCommand::Live,
            "start-live" => ConsoleCommand::StartLive,
            "stop-live" => ConsoleCommand::StopLive,
            "help" => ConsoleCommand::Help,
            "quit" | "exit" | "stop" => ConsoleCommand::Quit,
            "add" => ConsoleCommand::Add(
                arg.ok_or(ConsoleError::MissingSymbol("add"))?.to_string(),
            ),
            "remove" => ConsoleCommand::Remove(
                arg.ok_or(ConsoleError::MissingSymbol("remove"))?.to_string(),
            ),
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

pub const HELP: &str = "\
Commands:
  status         System status
  pause          Pause periodic screening
  resume         Resume periodic screening
  screen         Run a screening cycle now
  watchlist      Show the watchlist
  clear          Empty the watchlist
  add SYMBOL     Add a symbol
  remove SYMBOL  Remove a symbol
  live           Live stream health
  start-live     Start live streams
  stop-live      Stop live streams
  help           This help
  quit           Stop and exit";

/// Execute one command; `None` means the operator asked to quit
pub async fn handle(orchestrator: &Orchestrator, command: ConsoleCommand) -> Option<String> {
    let engine = orchestrator.engine();

    let output = match command {
        ConsoleCommand::Quit => return None,
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Status => format_status(&orchestrator.status().await),
        ConsoleCommand::Pause => {
            if engine.pause().await {
                "Screening paused".to_string()
            } else {
                "Screening already paused".to_string()
            }
        }
        ConsoleCommand::Resume => {
            if engine.resume().await {
                "Screening resumed".to_string()
            } else {
                "Screening is not paused".to_string()
            }
        }
        ConsoleCommand::Screen => match engine.cycle().await {
            Some(diff) if diff.is_empty() => "Watchlist unchanged".to_string(),
            Some(diff) => format!(
                "Added: {}\nRemoved: {}",
                join(diff.added.iter()),
                join(diff.removed.iter())
            ),
            None => "Screening paused, nothing to do".to_string(),
        },
        ConsoleCommand::Watchlist => {
            let snapshot = engine.snapshot().await;
            format!(
                "Watchlist ({}/{}): {}",
                snapshot.len(),
                snapshot.max_size,
                join(snapshot.symbols.iter())
            )
        }
        ConsoleCommand::Clear => format!("Removed {} symbols", engine.clear().await),
        ConsoleCommand::Add(symbol) => match engine.add(&symbol).await {
            Ok(true) => format!("Added {}", symbol.trim().to_uppercase()),
            Ok(false) => format!("{} already on watchlist", symbol.trim().to_uppercase()),
            Err(e) => e.to_string(),
        },
        ConsoleCommand::Remove(symbol) => match engine.remove(&symbol).await {
            Ok(true) => format!("Removed {}", symbol.trim().to_uppercase()),
            Ok(false) => format!("{} not on watchlist", symbol.trim().to_uppercase()),
            Err(e) => e.to_string(),
        },
        ConsoleCommand::Live => format_streams(&orchestrator.status().await.streams),
        ConsoleCommand::StartLive => {
            if engine.start_live().await {
                let streams = orchestrator.status().await.streams.len();
                format!("Live streaming started ({} streams)", streams)
            } else {
                "Live streaming already running".to_string()
            }
        }
        ConsoleCommand::StopLive => {
            if engine.stop_live().await {
                "Live streaming stopped".to_string()
            } else {
                "Live streaming is not running".to_string()
            }
        }
    };

    Some(output)
}

fn join<'a>(symbols: impl Iterator<Item = &'a String>) -> String {
    let joined = symbols.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

pub fn format_status(status: &SystemStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Phase:        {}", status.phase);
    let _ = writeln!(
        out,
        "Screening:    {}",
        if status.paused { "paused" } else { "active" }
    );
    let _ = writeln!(
        out,
        "Watchlist:    {}/{}",
        status.watchlist.len(),
        status.watchlist.max_size
    );
    let _ = writeln!(
        out,
        "Live:         {}",
        if status.watchlist.streaming { "on" } else { "off" }
    );
    let _ = writeln!(out, "Streams:      {}", status.streams.len());
    let _ = writeln!(out, "Unstreamed:   {}", join(status.unstreamed.iter()));
    let _ = writeln!(out, "Backfills:    {}", status.backfills_in_flight);
    let _ = write!(
        out,
        "Last cycle:   {}",
        status
            .last_cycle
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string())
    );
    out
}

pub fn format_streams(streams: &[StreamHealth]) -> String {
    if streams.is_empty() {
        return "No live streams".to_string();
    }

    let mut out = format!(
        "{:<6} {:<8} {:>6} {:>7} {:>8}  {}",
        "SYMBOL", "STATE", "ERRORS", "BARS", "EXCHANGE", "LAST UPDATE"
    );
    for s in streams {
        let _ = write!(
            out,
            "\n{:<6} {:<8} {:>6} {:>7} {:>8}  {}",
            s.symbol,
            if s.active { "active" } else { "stopped" },
            s.consecutive_errors,
            s.bars_written,
            s.exchange,
            s.last_update
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    out
}
