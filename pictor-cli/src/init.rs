//! Collection initializer — drop-and-recreate of the vector collection.
//!
//! The sequence is deliberate: drop any existing collection, create the
//! schema (64-bit primary key plus a 512-dim vector column), build the
//! ivfflat L2 index, then load. Every step is fatal on error, and re-running
//! always converges on the same empty state.

use anyhow::Result;
use pictor_core::config::{CollectionConfig, PictorConfig};
use pictor_core::store::{PgVectorStore, VectorStore};

pub async fn run(config: &PictorConfig) -> Result<()> {
    let store = PgVectorStore::connect(&config.database, &config.collection).await?;
    run_init(&store, &config.collection).await
}

/// The init sequence against any store. Split out so tests can drive it
/// with a fake.
pub async fn run_init(store: &dyn VectorStore, collection: &CollectionConfig) -> Result<()> {
    if store.collection_exists().await? {
        tracing::info!(collection = %collection.name, "Dropping existing collection");
        store.drop_collection().await?;
    }

    store.create_collection().await?;
    store.load().await?;

    println!("Collection {} initialized", collection.name);
    println!("  dimension: {}", collection.dimension);
    println!("  index:     ivfflat (L2, lists = {})", collection.index_lists);
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
