use anyhow::{Context, Result};
use siteproof_core::Config;

use super::App;

pub async fn run(config: Config) -> Result<()> {
    let blob_root = config.store.blob_root.clone();
    std::fs::create_dir_all(&blob_root)
        .with_context(|| format!("failed to create {}", blob_root.display()))?;

    let app = App::open(config).await?;

    eprintln!("Initialized siteproof store");
    eprintln!("  Database: {}", app.config.store.db_path.display());
    eprintln!("  Storage: {}", blob_root.display());
    Ok(())
}
