// ABOUTME: Command module aggregator for the hotswap CLI.
// ABOUTME: Re-exports command handlers and the shared config loader.

mod deploy;
mod history;
mod reclaim;
mod runtime_connection;
mod status;

pub use deploy::deploy;
pub use history::history;
pub use reclaim::reclaim;
pub use status::status;

use hotswap::config::{Config, Overrides};
use hotswap::error::Result;
use std::path::{Path, PathBuf};

/// A loaded configuration and the directory it was found in (hooks live there).
pub struct Loaded {
    pub config: Config,
    pub project_dir: PathBuf,
}

/// Load an explicit config file or discover one in `cwd`, then apply overrides.
pub fn load_config(path: Option<&Path>, cwd: &Path, overrides: &Overrides) -> Result<Loaded> {
    let (config, project_dir) = match path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            (Config::load(path)?, dir)
        }
        None => (Config::discover(cwd)?, cwd.to_path_buf()),
    };
    Ok(Loaded {
        config: config.with_overrides(overrides)?,
        project_dir,
    })
}
