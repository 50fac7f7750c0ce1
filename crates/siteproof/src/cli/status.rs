use std::collections::BTreeMap;

use anyhow::Result;
use siteproof_core::{Config, JobFilter, Providers};

use super::App;

pub async fn run(mut config: Config) -> Result<()> {
    config.providers.detect_tools();
    let providers = Providers::from_config(&config.providers)?;
    let app = App::open(config).await?;

    let artifacts = app.storage().list_artifacts(None).await?;
    let jobs = app.storage().list_jobs(JobFilter::default()).await?;

    let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
    for job in &jobs {
        *by_status.entry(job.status.as_str()).or_default() += 1;
    }

    println!("artifacts\t{}", artifacts.len());
    for (status, count) in &by_status {
        println!("jobs.{status}\t{count}");
    }

    eprintln!("Capabilities:");
    for (name, configured) in providers.describe() {
        let state = if configured { "configured" } else { "not configured" };
        eprintln!("  {name}: {state}");
    }
    Ok(())
}
