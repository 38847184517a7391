// ABOUTME: Config scaffolding for new services.
// ABOUTME: Writes a commented hotswap.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ServiceName};

use super::{CONFIG_FILENAME, Config};

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let mut config = Config::template();

    if let Some(s) = service {
        config.service = ServiceName::new(s).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    if let Some(i) = image {
        config.image = ImageRef::parse(i).map_err(|e| Error::InvalidConfig(e.to_string()))?;
    }

    std::fs::write(&config_path, template_yaml(&config))?;

    Ok(())
}

fn template_yaml(config: &Config) -> String {
    format!(
        r#"service: {service}
image: {image}

ports:
  container: {container}
  # Host port the candidate instance binds while it is health-checked
  staging: {staging}
  production: {production}

healthcheck:
  cmd: "{cmd}"
  # staging:
  #   interval: 3s
  #   retries: 3
  # production:
  #   interval: 30s
  #   retries: 5

# env:
#   RUST_LOG: info
#   DATABASE_URL:
#     env: DATABASE_URL

# resources:
#   memory: 512m
#   cpus: "1.0"

# monitor:
#   poll_interval: 2s
#   max_attempts: 30

# pull:
#   attempts: 3
#   delay: 5s

# stop:
#   timeout: 30s

# retention:
#   keep: 2
#   image_max_age: 24h

# Registry credentials are read from the secrets store, never from this file
# registry:
#   username_secret: registry-user
#   password_secret: registry-token
"#,
        service = config.service,
        image = config.image,
        container = config.ports.container,
        staging = config.ports.staging,
        production = config.ports.production,
        cmd = config.healthcheck.cmd,
    )
}
