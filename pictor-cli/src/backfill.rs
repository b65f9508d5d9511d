//! Image backfill — embed every image in a directory via the running
//! service and insert the resulting vectors into the collection.
//!
//! The batch is strictly sequential: one file, one HTTP call, one insert.
//! A failing file is logged and skipped; the batch never aborts on a
//! per-file error. One flush at the end makes the bulk load visible to the
//! ivfflat planner.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pictor_core::embedding::ImageEmbedder;
use pictor_core::store::{PgVectorStore, VectorRecord, VectorStore};
use pictor_core::{record_id, EmbedHttpClient, PictorConfig};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

pub async fn run(config: &PictorConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| PathBuf::from(&config.backfill.image_dir));
    if !dir.is_dir() {
        bail!("image directory {} does not exist", dir.display());
    }

    let store = PgVectorStore::connect(&config.database, &config.collection).await?;
    if !store.collection_exists().await? {
        bail!(
            "collection {} does not exist — run `pictor-cli init` first",
            config.collection.name
        );
    }

    let embedder = EmbedHttpClient::new(&config.backfill, config.collection.dimension)?;

    let report = run_backfill(&store, &embedder, &dir).await?;
    store.flush().await?;

    println!(
        "Backfill complete: {} inserted, {} failed",
        report.inserted, report.failed
    );
    Ok(())
}

/// Outcome counts for one backfill run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub inserted: usize,
    pub failed: usize,
}

/// Embed and insert every image file in `dir`. Returns the outcome counts.
///
/// Public for unit testing.
pub async fn run_backfill(
    store: &dyn VectorStore,
    embedder: &dyn ImageEmbedder,
    dir: &Path,
) -> Result<BackfillReport> {
    let files = collect_images(dir);
    tracing::info!(count = files.len(), dir = %dir.display(), "Starting backfill");

    let mut report = BackfillReport::default();
    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match backfill_one(store, embedder, path, &name).await {
            Ok(id) => {
                tracing::info!(file = %name, id, "Inserted vector");
                report.inserted += 1;
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Failed to process image, skipping");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Read, embed, and insert one image. The record id is derived from the
/// file name, not the path, so moving the directory keeps ids stable.
async fn backfill_one(
    store: &dyn VectorStore,
    embedder: &dyn ImageEmbedder,
    path: &Path,
    name: &str,
) -> Result<i64> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let embedding = embedder.embed(&bytes).await?;

    let id = record_id(name);
    store.insert(VectorRecord { id, embedding }).await?;
    Ok(id)
}

/// Flat enumeration of image files under `dir`: extension png/jpg/jpeg,
/// case-insensitive, sorted by path for a deterministic processing order.
/// Subdirectories are not descended into.
fn collect_images(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pictor_core::config::BackfillConfig;
    use pictor_core::embedding::{encode_image_payload, EmbedError};
    use pictor_core::store::StoreError;
    use std::sync::Mutex;
    use wiremock::matchers::{body_json, method, path as url_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Store fake that collects inserted records in memory.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<VectorRecord>>,
        fail_inserts: bool,
    }

    #[async_trait]
    impl VectorStore for MemoryStore {
        async fn collection_exists(&self) -> Result<bool, StoreError> {
            Ok(true)
        }
        async fn drop_collection(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn create_collection(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn load(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn insert(&self, record: VectorRecord) -> Result<(), StoreError> {
            if self.fail_inserts {
                return Err(StoreError::Backend("insert refused".to_string()));
            }
            self.rows.lock().unwrap().push(record);
            Ok(())
        }
        async fn flush(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn count(&self) -> Result<i64, StoreError> {
            Ok(self.rows.lock().unwrap().len() as i64)
        }
    }

    /// Embedder that fails for any image whose bytes contain `poison`.
    struct SelectiveEmbedder {
        poison: &'static [u8],
    }

    #[async_trait]
    impl ImageEmbedder for SelectiveEmbedder {
        async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
            if image
                .windows(self.poison.len())
                .any(|w| w == self.poison)
            {
                return Err(EmbedError::Inference("poisoned image".to_string()));
            }
            Ok(vec![0.0; 512])
        }
        fn dimensions(&self) -> usize {
            512
        }
        fn name(&self) -> &str {
            "selective"
        }
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    // TEST 1: only png/jpg/jpeg files are picked up, case-insensitively,
    //         and nested directories are ignored
    #[test]
    fn test_collect_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.png", b"a");
        write_file(dir.path(), "b.txt", b"b");
        write_file(dir.path(), "c.JPG", b"c");
        write_file(dir.path(), "d.jpeg", b"d");
        write_file(dir.path(), "noext", b"e");
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_file(&dir.path().join("nested"), "f.png", b"f");

        let names: Vec<String> = collect_images(dir.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.png", "c.JPG", "d.jpeg"]);
    }

    // TEST 2: inserted ids match the filename hash derivation
    #[tokio::test]
    async fn test_backfill_inserts_derived_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.png", b"image a");
        write_file(dir.path(), "b.jpg", b"image b");

        let store = MemoryStore::default();
        let embedder = SelectiveEmbedder { poison: b"\0never" };

        let report = run_backfill(&store, &embedder, dir.path()).await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                inserted: 2,
                failed: 0
            }
        );

        let rows = store.rows.lock().unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![record_id("a.png"), record_id("b.jpg")]);
        assert!(rows.iter().all(|r| r.embedding.len() == 512));
    }

    // TEST 3: one failing file is skipped, the rest are still inserted
    #[tokio::test]
    async fn test_backfill_isolates_per_file_failures() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.png", b"fine");
        write_file(dir.path(), "bad.png", b"poison pixel soup");
        write_file(dir.path(), "c.png", b"also fine");

        let store = MemoryStore::default();
        let embedder = SelectiveEmbedder { poison: b"poison" };

        let report = run_backfill(&store, &embedder, dir.path()).await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                inserted: 2,
                failed: 1
            }
        );
        assert_eq!(store.count().await.unwrap(), 2);
    }

    // TEST 4: a store that refuses inserts fails every file but the run
    //         still completes with a report
    #[tokio::test]
    async fn test_backfill_survives_failing_store() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.png", b"one");
        write_file(dir.path(), "b.png", b"two");

        let store = MemoryStore {
            rows: Mutex::new(Vec::new()),
            fail_inserts: true,
        };
        let embedder = SelectiveEmbedder { poison: b"\0never" };

        let report = run_backfill(&store, &embedder, dir.path()).await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                inserted: 0,
                failed: 2
            }
        );
    }

    // TEST 5: end to end against a mock service — one 500 response skips
    //         that file only, and the posted payloads are data-URI shaped
    #[tokio::test]
    async fn test_backfill_against_mock_service() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "bad.png", b"corrupt bytes");
        write_file(dir.path(), "good.png", b"good bytes");

        let mock_server = MockServer::start().await;

        // Specific mock first: wiremock matches in mount order.
        Mock::given(method("POST"))
            .and(url_path("/api/embed"))
            .and(body_json(serde_json::json!({
                "image_base64": encode_image_payload(b"corrupt bytes")
            })))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "detail": "internal server error: image decode failed"
            })))
            .mount(&mock_server)
            .await;

        let embedding: Vec<f32> = (0..512).map(|i| i as f32).collect();
        Mock::given(method("POST"))
            .and(url_path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "embedding": embedding,
                "dimension": 512
            })))
            .mount(&mock_server)
            .await;

        let backfill_config = BackfillConfig {
            endpoint: mock_server.uri(),
            request_timeout_seconds: 5,
            image_dir: String::new(),
        };
        let embedder = EmbedHttpClient::new(&backfill_config, 512).unwrap();
        let store = MemoryStore::default();

        let report = run_backfill(&store, &embedder, dir.path()).await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                inserted: 1,
                failed: 1
            }
        );

        let rows = store.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, record_id("good.png"));
    }
}
