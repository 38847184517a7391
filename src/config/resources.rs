// ABOUTME: Resource caps for release containers: memory, CPU quota and CPU shares.
// ABOUTME: Parses human strings like "512m" and "1.5" into runtime limits.

use serde::Deserialize;

use crate::runtime::ResourceLimits;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcesConfig {
    /// Memory cap such as `512m` or `1g`.
    #[serde(default)]
    pub memory: Option<String>,

    /// CPU quota in cores such as `0.5` or `2`.
    #[serde(default)]
    pub cpus: Option<String>,

    /// Relative CPU weight (runtime default 1024).
    #[serde(default)]
    pub cpu_shares: Option<u32>,
}

impl ResourcesConfig {
    pub fn to_limits(&self) -> Result<ResourceLimits, String> {
        let memory = self
            .memory
            .as_deref()
            .map(|m| parse_memory(m).ok_or_else(|| format!("invalid memory limit: {}", m)))
            .transpose()?;

        let cpus = self
            .cpus
            .as_deref()
            .map(|c| match c.trim().parse::<f64>() {
                Ok(n) if n > 0.0 && n.is_finite() => Ok(n),
                _ => Err(format!("invalid cpu limit: {}", c)),
            })
            .transpose()?;

        Ok(ResourceLimits {
            memory,
            cpus,
            cpu_shares: self.cpu_shares,
        })
    }
}

/// Parse `512m`, `1g`, `64k`, `1024` (bytes). Suffixes are binary multiples.
pub fn parse_memory(limit: &str) -> Option<u64> {
    let limit = limit.trim().to_ascii_lowercase();
    let limit = limit.strip_suffix('b').unwrap_or(&limit);
    let (digits, multiplier) = match limit.char_indices().last()? {
        (i, 'k') => (&limit[..i], 1u64 << 10),
        (i, 'm') => (&limit[..i], 1u64 << 20),
        (i, 'g') => (&limit[..i], 1u64 << 30),
        _ => (limit, 1),
    };
    digits
        .parse::<u64>()
        .ok()
        .filter(|n| *n > 0)
        .and_then(|n| n.checked_mul(multiplier))
}
