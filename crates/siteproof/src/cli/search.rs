use anyhow::Result;
use siteproof_core::{Config, Owner, ScanIndex, SearchIndex};

use super::{clip, App};

pub async fn run(config: Config, query: &str, scope: Option<Owner>, as_json: bool) -> Result<()> {
    let app = App::open(config).await?;
    let index = ScanIndex::new(app.storage().clone());
    let matches = index.search(query, scope).await?;

    if matches.is_empty() {
        eprintln!("No matches for '{query}'");
        return Ok(());
    }

    for m in &matches {
        if as_json {
            println!("{}", serde_json::to_string(m)?);
        } else {
            println!(
                "{}\t{}\t{}\t{}",
                m.artifact.id,
                m.tier.as_str(),
                m.artifact.original_filename,
                clip(&m.snippet, 100)
            );
        }
    }
    Ok(())
}
