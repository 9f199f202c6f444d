// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Grounded on `fendermint_app_options`: a top-level `Options` with a home
// directory, a run mode, a log-level enum with a `tracing_level` mapping,
// and one subcommand per operator task.
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use self::{daemon::DaemonArgs, inspect::InspectArgs, keygen::KeygenArgs};

pub mod daemon;
pub mod inspect;
pub mod keygen;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug)]
#[command(version)]
pub struct Options {
    /// Set a custom directory for data and configuration files.
    #[arg(short = 'd', long, default_value = "~/.kernel", env = "KERNEL_HOME_DIR")]
    pub home_dir: PathBuf,

    /// Optionally override the default configuration.
    #[arg(short, long, default_value = "dev")]
    pub mode: String,

    /// Set the logging level.
    #[arg(short, long, default_value = "info", value_enum, env = "LOG_LEVEL")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

impl Options {
    /// Tracing level, unless it's turned off.
    pub fn tracing_level(&self) -> Option<tracing::Level> {
        match self.log_level {
            LogLevel::Off => None,
            LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warn => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace => Some(tracing::Level::TRACE),
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.home_dir.join("config")
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the kernel daemon.
    Daemon(DaemonArgs),
    /// Generate a remote-peer keypair.
    Keygen(KeygenArgs),
    /// Print the stored state of a kernel-space reference.
    Inspect(InspectArgs),
}

pub fn parse() -> Options {
    Options::parse()
}
