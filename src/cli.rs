mod help_text;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Verify an installation against the published checksums of its release
#[derive(Parser, Debug)]
#[command(name = "coreward", version, about, long_about = help_text::ROOT_LONG_ABOUT)]
pub struct Cli {
    /// Run as if started in DIR
    #[arg(short = 'C', value_name = "DIR", global = true)]
    pub directory: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). Takes precedence over RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Set the log level explicitly. Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL", global = true, conflicts_with = "verbose")]
    pub log_level: Option<LogLevel>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Settings that override the config file.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Config file (default: coreward.toml in the installation root)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Release to verify instead of the detected one
    #[arg(long, value_name = "VERSION", global = true)]
    pub release: Option<String>,

    /// Directory holding the release manifests
    #[arg(long, value_name = "DIR", global = true)]
    pub manifest_dir: Option<PathBuf>,

    /// Directory holding the suppression cache and options
    #[arg(long, value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Append audit events to this JSON lines file
    #[arg(long, value_name = "FILE", global = true)]
    pub audit_log: Option<PathBuf>,

    /// Number of hashing threads (default: one per CPU)
    #[arg(long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// Manifest fetch timeout in seconds (1-60)
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show files that differ from the release (added, removed, modified)
    #[command(long_about = help_text::STATUS_LONG_ABOUT)]
    Status {
        /// Also list files matching the release
        #[arg(long)]
        all: bool,

        /// Also list flagged files marked as fixed
        #[arg(long)]
        show_suppressed: bool,
    },

    /// Unattended scan reporting discrepancies to the audit log
    #[command(long_about = help_text::SCAN_LONG_ABOUT)]
    Scan,

    /// Restore, delete or mark as fixed a batch of flagged files
    #[command(long_about = help_text::APPLY_LONG_ABOUT)]
    Apply {
        /// restore, delete or fixed
        #[arg(long, value_name = "ACTION")]
        action: Option<String>,

        /// Confirm that you understand the risk of this operation
        #[arg(long)]
        confirm: bool,

        /// Entries as CLASSIFICATION@PATH, e.g. added@wp-admin/shell.php
        #[arg(value_name = "ENTRY")]
        entries: Vec<String>,
    },

    /// Show a line diff between the released and the local file
    Diff {
        /// Path relative to the installation root
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// List or remove files marked as fixed
    Suppressions {
        #[command(subcommand)]
        command: SuppressionsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SuppressionsCommand {
    /// List suppressed paths
    List,

    /// Remove suppressions so the paths are reported again
    Remove {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<String>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
