// ABOUTME: Status command implementation.
// ABOUTME: Lists the managed instances of the service and marks the one serving.

use super::Loaded;
use super::runtime_connection::connect_to_runtime;
use hotswap::deploy::{ListedInstance, current_production, list_instances};
use hotswap::error::Result;
use hotswap::output::Output;
use hotswap::types::{InstanceName, Role};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct InstanceRow<'a> {
    name: &'a InstanceName,
    role: Role,
    version: String,
    state: String,
    status: &'a str,
    image: &'a str,
    serving: bool,
}

impl<'a> InstanceRow<'a> {
    fn new(instance: &'a ListedInstance, serving: bool) -> Self {
        Self {
            name: &instance.name,
            role: instance.name.role(),
            version: instance.name.version().to_string(),
            state: instance.summary.state.to_string(),
            status: &instance.summary.status,
            image: &instance.summary.image,
            serving,
        }
    }
}

pub async fn status(loaded: Loaded, output: Output) -> Result<()> {
    let config = loaded.config;
    let runtime = connect_to_runtime(&config, &output).await?;
    let instances = list_instances(&runtime, &config.service).await?;
    let serving = current_production(&instances).map(|i| i.summary.id.clone());

    let rows: Vec<InstanceRow<'_>> = instances
        .iter()
        .map(|i| InstanceRow::new(i, Some(&i.summary.id) == serving.as_ref()))
        .collect();

    for row in &rows {
        output.json(row);
    }

    output.line(&format!("Service: {}", config.service));
    output.line(&format!("Image:   {}", config.image));
    match instances.iter().find(|i| Some(&i.summary.id) == serving.as_ref()) {
        Some(current) => output.line(&format!(
            "Serving: {} on port {}",
            current.name, config.ports.production
        )),
        None => output.line("Serving: nothing"),
    }

    if rows.is_empty() {
        output.line("No managed instances.");
        return Ok(());
    }

    output.line("");
    output.line(&format!(
        "{:<40} {:<11} {:<10} {}",
        "NAME", "ROLE", "STATE", "IMAGE"
    ));
    for row in &rows {
        let marker = if row.serving { " *" } else { "" };
        output.line(&format!(
            "{:<40} {:<11} {:<10} {}{}",
            row.name.to_string(),
            row.role.to_string(),
            row.state,
            row.image,
            marker
        ));
    }
    Ok(())
}
