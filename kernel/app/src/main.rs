// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

pub use kernel_app_options as options;
pub use kernel_app_settings as settings;

mod app;
mod cmd;

#[tokio::main]
async fn main() {
    let opts = options::parse();

    if let Some(level) = opts.tracing_level() {
        init_log(level);
    }

    if let Err(e) = cmd::exec(&opts).await {
        tracing::error!("failed to execute {:?}: {e:?}", opts);
        std::process::exit(1);
    }
}

fn init_log(level: tracing::Level) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
