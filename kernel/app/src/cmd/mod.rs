// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

//! CLI command implementations.
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use kernel_app_options::{Commands, Options};
use kernel_app_settings::Settings;

pub mod daemon;
pub mod inspect;
pub mod keygen;

#[async_trait]
pub trait Cmd {
    async fn exec(&self, settings: Settings) -> anyhow::Result<()>;
}

/// Convenience macro for declaring a command that needs the parsed
/// settings to run, mirroring `fendermint_app`'s own `cmd!` helper.
#[macro_export]
macro_rules! cmd {
    ($name:ident($self:ident, $settings:ident) $exec:expr) => {
        #[async_trait::async_trait]
        impl $crate::cmd::Cmd for $name {
            async fn exec(&$self, $settings: Settings) -> anyhow::Result<()> {
                $exec
            }
        }
    };
}

pub async fn exec(options: &Options) -> anyhow::Result<()> {
    let settings = settings_for(options)?;
    match &options.command {
        Commands::Daemon(args) => args.exec(settings).await,
        Commands::Keygen(args) => args.exec(settings).await,
        Commands::Inspect(args) => args.exec(settings).await,
    }
}

fn settings_for(options: &Options) -> anyhow::Result<Settings> {
    let config_dir = options.config_dir();
    if !config_dir.is_dir() {
        return Err(anyhow!("config directory {config_dir:?} does not exist"));
    }
    Settings::new(&config_dir, &options.home_dir, &options.mode).context("error parsing settings")
}
