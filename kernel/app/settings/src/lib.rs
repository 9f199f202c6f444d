// Copyright 2022-2023 Protocol Labs
// SPDX-License-Identifier: Apache-2.0, MIT

// Grounded on `fendermint_app_settings`: a layered `config` build (default
// file, optional mode override, optional local override, environment
// variables), deserialized once into a frozen `Settings` struct, with paths
// resolved relative to `--home-dir` the same way.
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DbSettings {
    /// Path to the sqlite file backing the kernel store, relative to the
    /// home directory unless absolute.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct RpcSettings {
    pub listen: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoteSettings {
    pub listen_multiaddr: String,
    /// Where the persisted peer keypair lives, relative to the home
    /// directory unless absolute.
    pub key_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between `bringOutYourDead` sweeps; 0 disables the sweep.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct VatsSettings {
    /// Directory `bundle_name`s in `launchVat`/`launchSubcluster` are
    /// resolved against; each bundle is a `<bundles_dir>/<bundle_name>.wasm`
    /// file.
    pub bundles_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    home_dir: PathBuf,
    pub db: DbSettings,
    pub rpc: RpcSettings,
    pub remote: RemoteSettings,
    pub scheduler: SchedulerSettings,
    pub vats: VatsSettings,
}

impl Settings {
    /// Load the default configuration from a directory, then potential
    /// mode-specific overrides, then overrides from the local environment.
    pub fn new(config_dir: &Path, home_dir: &Path, run_mode: &str) -> Result<Self, ConfigError> {
        let c = Config::builder()
            .add_source(File::from(config_dir.join("default")))
            .add_source(File::from(config_dir.join(run_mode)).required(false))
            .add_source(File::from(config_dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix("kernel")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override("home_dir", home_dir.to_string_lossy().as_ref())?
            .build()?;

        c.try_deserialize()
    }

    fn expand_path(&self, path: &Path) -> PathBuf {
        if path.starts_with("/") {
            return path.to_path_buf();
        }
        if path.starts_with("~") {
            return expand_tilde(path);
        }
        expand_tilde(self.home_dir.join(path))
    }

    pub fn db_path(&self) -> PathBuf {
        self.expand_path(&self.db.path)
    }

    pub fn remote_key_path(&self) -> PathBuf {
        self.expand_path(&self.remote.key_path)
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.expand_path(&self.vats.bundles_dir)
    }

    pub fn bundle_path(&self, bundle_name: &str) -> PathBuf {
        self.bundles_dir().join(format!("{bundle_name}.wasm"))
    }
}

/// Expand paths that begin with "~" to `$HOME`.
pub fn expand_tilde<P: AsRef<Path>>(path: P) -> PathBuf {
    let p = path.as_ref().to_path_buf();
    if !p.starts_with("~") {
        return p;
    }
    if p == Path::new("~") {
        return dirs::home_dir().unwrap_or(p);
    }
    dirs::home_dir()
        .map(|mut h| {
            if h == Path::new("/") {
                p.strip_prefix("~").unwrap().to_path_buf()
            } else {
                h.push(p.strip_prefix("~/").unwrap());
                h
            }
        })
        .unwrap_or(p)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::expand_tilde;

    #[test]
    fn tilde_expands_to_home() {
        let home = std::env::var("HOME").expect("should work on Linux");
        let home_project = PathBuf::from(format!("{}/.kernel", home));
        assert_eq!(expand_tilde("~/.kernel"), home_project);
        assert_eq!(expand_tilde("/foo/bar"), PathBuf::from("/foo/bar"));
    }
}
