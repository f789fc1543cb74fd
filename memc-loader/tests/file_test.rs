use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use flate2::{write::GzEncoder, Compression};
use memc_loader::error::PipelineError;
use memc_loader::pipeline::{Pipeline, PipelineOptions};
use memc_loader::router::{Router, Target};
use memc_loader::source::{discover_files, finalize};
use memc_loader::store::MockStore;
use tempfile::TempDir;

fn write_gzip(path: &Path, contents: &str) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(contents.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn pipeline(store: &MockStore) -> Pipeline {
    let router = Router::new(
        ["idfa", "gaid", "adid", "dvid"]
            .into_iter()
            .map(|t| Target::new(t, format!("mock-{t}"), Arc::new(store.clone()))),
    );
    Pipeline::new(router, PipelineOptions::default())
}

#[tokio::test]
async fn test_files_are_loaded_in_order_and_hidden() {
    let dir = TempDir::new().unwrap();
    write_gzip(
        &dir.path().join("20170929000000.tsv.gz"),
        "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
         gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424\n",
    );
    write_gzip(
        &dir.path().join("20170929000100.tsv.gz"),
        "adid\tabc\t1\t2\t3\nbogus line\n",
    );
    write_gzip(&dir.path().join(".20170929000200.tsv.gz"), "dvid\tseen\t1\t2\t3\n");

    let store = MockStore::new();
    let pipeline = pipeline(&store);
    let files = discover_files(dir.path(), "[!.]*.tsv.gz").await.unwrap();
    assert_eq!(files.len(), 2);

    let mut summaries = vec![];
    let mut acceptable = vec![];
    for path in &files {
        let summary = pipeline.process_file(path).await.unwrap();
        acceptable.push(finalize(path, &summary, 0.01, false).await);
        summaries.push(summary);
    }

    assert_eq!((summaries[0].processed, summaries[0].errors), (2, 0));
    assert_eq!((summaries[1].processed, summaries[1].errors), (1, 1));
    // Half of the second file failed, yet both files are marked as consumed
    assert_eq!(acceptable, vec![true, false]);
    let mut keys = store.stored_keys();
    keys.sort();
    assert_eq!(keys, vec!["adid:abc", "gaid:7rfw452y52g2gq4g", "idfa:1rfw452y52g2gq4g"]);

    assert!(discover_files(dir.path(), "[!.]*.tsv.gz").await.unwrap().is_empty());
    assert!(dir.path().join(".20170929000000.tsv.gz").exists());
    assert!(dir.path().join(".20170929000100.tsv.gz").exists());
}

#[tokio::test]
async fn test_corrupt_file_fails_and_is_not_finalized() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.tsv.gz");
    std::fs::write(&path, b"definitely not gzip").unwrap();

    let store = MockStore::new();
    let result = pipeline(&store).process_file(&path).await;

    assert!(matches!(result, Err(PipelineError::Decompression(_))));
    assert!(store.get_calls().is_empty());
    assert!(path.exists());
}

#[tokio::test]
async fn test_missing_file_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let store = MockStore::new();

    let result = pipeline(&store).process_file(&dir.path().join("gone.tsv.gz")).await;

    assert!(matches!(result, Err(PipelineError::SourceOpen { .. })));
}
