use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use siteproof_core::{export, Config, Owner};

use super::App;

pub async fn run(config: Config, scope: Option<Owner>, output: Option<&Path>) -> Result<()> {
    let app = App::open(config).await?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut out = BufWriter::new(sink);

    let count = export::export_claims(app.storage(), scope, &mut out).await?;
    out.flush()?;

    eprintln!("Exported {count} claims");
    Ok(())
}
