// ABOUTME: History command implementation.
// ABOUTME: Prints the most recent release records from the journal.

use super::Loaded;
use hotswap::deploy::Journal;
use hotswap::error::Result;
use hotswap::output::Output;

pub fn history(loaded: Loaded, limit: usize, output: Output) -> Result<()> {
    let config = loaded.config;
    let journal = Journal::open(&config.state_dir()?, &config.service);
    let records = journal.recent(limit)?;

    if records.is_empty() {
        output.line(&format!("No releases recorded for {}.", config.service));
        return Ok(());
    }

    output.line(&format!(
        "{:<19} {:<12} {:>8}  {:<30} {}",
        "VERSION", "OUTCOME", "DURATION", "IMAGE", "DETAIL"
    ));
    for record in &records {
        output.json(record);
        let detail = record
            .failure
            .as_ref()
            .map(|f| format!("{}: {}", f.stage, f.message))
            .unwrap_or_default();
        output.line(&format!(
            "{:<19} {:<12} {:>7}s  {:<30} {}",
            record.version,
            record.outcome.to_string(),
            record.duration().num_seconds(),
            record.image,
            detail
        ));
    }
    Ok(())
}
