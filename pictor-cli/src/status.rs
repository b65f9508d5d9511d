//! Status report: embedding service health plus collection size.

use std::time::Duration;

use anyhow::Result;
use pictor_core::store::{PgVectorStore, VectorStore};
use pictor_core::PictorConfig;

pub async fn run(config: &PictorConfig) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!(
        "{}/health",
        config.backfill.endpoint.trim_end_matches('/')
    );
    match client.get(&url).send().await {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().await.unwrap_or_default();
            println!(
                "Embedding service: {}",
                body["status"].as_str().unwrap_or("unknown")
            );
        }
        Ok(r) => {
            eprintln!("pictor-cli: service unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("pictor-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    // Best effort: the service can be healthy while the database is down.
    match collection_count(config).await {
        Ok(Some(count)) => {
            println!("Collection {}:  {} vectors", config.collection.name, count)
        }
        Ok(None) => println!(
            "Collection {}:  not created (run `pictor-cli init`)",
            config.collection.name
        ),
        Err(e) => println!("Collection {}:  unavailable ({})", config.collection.name, e),
    }

    Ok(())
}

async fn collection_count(config: &PictorConfig) -> Result<Option<i64>> {
    let store = PgVectorStore::connect(&config.database, &config.collection).await?;
    if !store.collection_exists().await? {
        return Ok(None);
    }
    Ok(Some(store.count().await?))
}
