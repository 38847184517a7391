// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments and HOTSWAP_* environment fallbacks.

use clap::{Args, Parser, Subcommand};
use hotswap::config::Overrides;
use hotswap::error::{Error, Result};
use hotswap::types::{ImageRef, ServiceName};
use humantime_serde::re::humantime;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hotswap")]
#[command(about = "Zero-downtime blue-green container releases for Docker and Podman")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output for CI (only final result)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output as JSON lines for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the configuration file (default: discover hotswap.yml)
    #[arg(short, long, global = true, env = "HOTSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new hotswap.yml configuration file
    Init {
        /// Service name
        #[arg(short, long)]
        service: Option<String>,

        /// Container image
        #[arg(short, long)]
        image: Option<String>,

        /// Overwrite existing config file
        #[arg(short, long)]
        force: bool,
    },

    /// Release the configured image with zero downtime
    Deploy {
        #[command(flatten)]
        overrides: DeployArgs,

        /// Break a deploy lock held by another run
        #[arg(short, long)]
        force: bool,
    },

    /// Show the managed instances of the service
    Status,

    /// Remove superseded stopped instances and old unused images
    Reclaim {
        /// Stopped instances to keep besides the serving one
        #[arg(long, env = "HOTSWAP_RETAIN")]
        retain: Option<usize>,

        /// Prune unused images older than this (e.g. 24h)
        #[arg(long, value_parser = parse_duration)]
        max_age: Option<Duration>,
    },

    /// Show recent releases from the journal
    History {
        /// Number of releases to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

/// Flags that override the configuration file for one release.
#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Image to release
    #[arg(long, env = "HOTSWAP_IMAGE")]
    pub image: Option<String>,

    /// Service (container base) name
    #[arg(long, env = "HOTSWAP_NAME")]
    pub name: Option<String>,

    /// Host port the staging instance binds
    #[arg(long, env = "HOTSWAP_STAGING_PORT")]
    pub staging_port: Option<u16>,

    /// Host port the production instance binds
    #[arg(long, env = "HOTSWAP_PRODUCTION_PORT")]
    pub production_port: Option<u16>,

    /// Port the application listens on inside the container
    #[arg(long, env = "HOTSWAP_CONTAINER_PORT")]
    pub container_port: Option<u16>,

    /// Memory limit (e.g. 512m, 1g)
    #[arg(long, env = "HOTSWAP_MEMORY")]
    pub memory: Option<String>,

    /// CPU limit (e.g. 0.5, 2)
    #[arg(long, env = "HOTSWAP_CPUS")]
    pub cpus: Option<String>,

    /// Healthcheck interval (e.g. 5s)
    #[arg(long, env = "HOTSWAP_HEALTH_INTERVAL", value_parser = parse_duration)]
    pub health_interval: Option<Duration>,

    /// Healthcheck timeout (e.g. 3s)
    #[arg(long, env = "HOTSWAP_HEALTH_TIMEOUT", value_parser = parse_duration)]
    pub health_timeout: Option<Duration>,

    /// Consecutive failed checks before the instance is unhealthy
    #[arg(long, env = "HOTSWAP_HEALTH_RETRIES")]
    pub health_retries: Option<u32>,

    /// Grace period before a stopping container is killed (e.g. 30s)
    #[arg(long, env = "HOTSWAP_STOP_TIMEOUT", value_parser = parse_duration)]
    pub stop_timeout: Option<Duration>,

    /// Stopped instances to keep besides the serving one
    #[arg(long, env = "HOTSWAP_RETAIN")]
    pub retain: Option<usize>,
}

impl DeployArgs {
    /// Validate names and images and build config overrides.
    pub fn to_overrides(&self) -> Result<Overrides> {
        let service = self
            .name
            .as_deref()
            .map(ServiceName::new)
            .transpose()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        let image = self
            .image
            .as_deref()
            .map(ImageRef::parse)
            .transpose()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        Ok(Overrides {
            service,
            image,
            staging_port: self.staging_port,
            production_port: self.production_port,
            container_port: self.container_port,
            memory: self.memory.clone(),
            cpus: self.cpus.clone(),
            health_interval: self.health_interval,
            health_timeout: self.health_timeout,
            health_retries: self.health_retries,
            stop_timeout: self.stop_timeout,
            retain: self.retain,
        })
    }
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn deploy_flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "hotswap",
            "deploy",
            "--image",
            "nginx:1.27",
            "--staging-port",
            "9001",
            "--health-interval",
            "2s",
            "--retain",
            "5",
        ])
        .unwrap();

        let Commands::Deploy { overrides, force } = cli.command else {
            panic!("expected deploy");
        };
        assert!(!force);
        let overrides = overrides.to_overrides().unwrap();
        assert_eq!(overrides.image.unwrap().to_string(), "nginx:1.27");
        assert_eq!(overrides.staging_port, Some(9001));
        assert_eq!(overrides.health_interval, Some(Duration::from_secs(2)));
        assert_eq!(overrides.retain, Some(5));
    }

    #[test]
    fn invalid_service_name_is_rejected() {
        let args = DeployArgs {
            name: Some("Not Valid!".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            args.to_overrides(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn quiet_conflicts_with_json() {
        assert!(Cli::try_parse_from(["hotswap", "--quiet", "--json", "status"]).is_err());
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        assert!(
            Cli::try_parse_from(["hotswap", "deploy", "--stop-timeout", "soon"]).is_err()
        );
    }
}
