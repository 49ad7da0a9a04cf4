// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use consult_core::SenderRole;

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

fn parse_role(s: &str) -> Result<SenderRole, String> {
    s.parse::<SenderRole>().map_err(|e| e.to_string())
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

const QUICKSTART_HELP: &str = "\
Get started:
  consult init --gateway <url> --sender <id>   Configure this device
  consult send C1 \"Bird appears lethargic\"     Send (or queue) a message
  consult history C1                           Show the conversation
  consult pending                              Show queued messages
  consult flush                                Deliver queued messages now";

#[derive(Parser)]
#[command(name = "consult")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline-tolerant consultation messaging")]
#[command(
    long_about = "Offline-tolerant consultation messaging.\n\n\
    Messages written without connectivity are queued on disk and delivered \
    once the gateway is reachable again."
)]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    /// Directory holding consult.toml and the pending queue
    #[arg(long, global = true, value_name = "path")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Configure this device
    #[command(after_help = "Examples:\n  \
        consult init --gateway https://proj.supabase.co/rest/v1 --sender farm-17\n  \
        consult init --gateway http://localhost:3000 --sender vet-2 --role specialist")]
    Init {
        /// Base URL of the gateway REST API
        #[arg(long, value_name = "url")]
        gateway: String,

        /// Sender id to write messages as
        #[arg(long, value_parser = non_empty_string)]
        sender: String,

        /// Sender role (reporter or specialist)
        #[arg(long, default_value = "reporter", value_parser = parse_role)]
        role: SenderRole,

        /// Project API key sent with every request
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Send a message, queueing it when the gateway is unreachable
    Send {
        /// Consultation id
        #[arg(value_parser = non_empty_string)]
        consultation: String,

        /// Message text
        #[arg(value_parser = non_empty_string)]
        text: String,

        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Show the merged conversation
    History {
        /// Consultation id
        #[arg(value_parser = non_empty_string)]
        consultation: String,

        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// List messages waiting for delivery
    Pending {
        /// Only show this consultation
        consultation: Option<String>,

        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Run one delivery cycle now
    Flush {
        /// Reset retry counters first, releasing parked messages
        #[arg(long)]
        force: bool,

        /// Output format
        #[arg(long, short, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Follow a conversation until interrupted
    Watch {
        /// Consultation id
        #[arg(value_parser = non_empty_string)]
        consultation: String,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
