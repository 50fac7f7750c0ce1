use std::sync::Arc;

use anyhow::Result;
use siteproof_core::{Config, Pipeline, PipelineSettings, Providers, Worker};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::App;

pub async fn run(mut config: Config, once: bool) -> Result<()> {
    config.providers.detect_tools();
    let providers = Providers::from_config(&config.providers)?;
    for (name, configured) in providers.describe() {
        info!(capability = name, configured, "capability");
    }

    let settings = PipelineSettings::from_config(&config);
    let poll_interval = config.worker.poll_interval();
    let app = App::open(config).await?;

    let pipeline = Pipeline::new(app.storage().clone(), app.blobs.clone(), providers)
        .with_settings(settings);
    let worker = Worker::new(app.queue.clone(), Arc::new(pipeline), poll_interval);

    if once {
        let processed = worker.drain().await?;
        eprintln!("Processed {processed} jobs");
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "could not listen for ctrl-c");
            return;
        }
        info!("shutdown requested, finishing current job");
        signal.cancel();
    });

    worker.run(shutdown).await?;
    Ok(())
}
