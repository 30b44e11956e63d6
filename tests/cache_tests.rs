use std::fs;

use anyhow::Result;
use conjure::cache::{CacheKey, FileStore, ImplementationStore};

const FIB_SIGNATURE: &str = "(n: int) -> int";
const FIB_SOURCE: &str = "def fibonacci(n: int) -> int:\n    return n if n < 2 else fibonacci(n-1) + fibonacci(n-2)\n";

fn temp_store_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("conjure-store-test")
        .tempdir()
        .expect("failed to create temp dir")
}

#[test]
fn archived_sources_round_trip_through_the_file() -> Result<()> {
    let dir = temp_store_dir();
    let path = dir.path().join("conjure_store.json");

    let store = FileStore::open(&path);
    store.archive("fibonacci", FIB_SIGNATURE, FIB_SOURCE)?;

    // A fresh handle sees exactly what the first one wrote.
    let reopened = FileStore::open(&path);
    assert_eq!(
        reopened.retrieve("fibonacci", FIB_SIGNATURE).as_deref(),
        Some(FIB_SOURCE)
    );
    assert_eq!(reopened.retrieve("fibonacci", "(n: int) -> float"), None);
    Ok(())
}

#[test]
fn missing_store_reads_as_empty() {
    let dir = temp_store_dir();
    let store = FileStore::open(dir.path().join("absent.json"));
    assert_eq!(store.retrieve("fibonacci", FIB_SIGNATURE), None);
    assert!(store.entries().is_empty());
    assert!(!store.path().exists());
}

#[test]
fn corrupted_store_reads_as_empty_and_is_replaced_on_write() -> Result<()> {
    let dir = temp_store_dir();
    let path = dir.path().join("conjure_store.json");
    fs::write(&path, "{ this is not json")?;

    let store = FileStore::open(&path);
    assert_eq!(store.retrieve("fibonacci", FIB_SIGNATURE), None);

    store.archive("fibonacci", FIB_SIGNATURE, FIB_SOURCE)?;
    assert_eq!(store.entries().len(), 1);
    Ok(())
}

#[test]
fn archiving_again_overwrites() -> Result<()> {
    let dir = temp_store_dir();
    let store = FileStore::open(dir.path().join("conjure_store.json"));
    store.archive("square", "(x)", "def square(x):\n    return x * x\n")?;
    store.archive("square", "(x)", "def square(x):\n    return x ** 2\n")?;

    assert_eq!(store.entries().len(), 1);
    assert_eq!(
        store.retrieve("square", "(x)").as_deref(),
        Some("def square(x):\n    return x ** 2\n")
    );
    Ok(())
}

#[test]
fn remove_reports_whether_an_entry_existed() -> Result<()> {
    let dir = temp_store_dir();
    let store = FileStore::open(dir.path().join("conjure_store.json"));
    let key = CacheKey::derive("square", "(x)");
    store.save(&key, "def square(x):\n    return x * x\n")?;

    assert!(store.remove(&key)?);
    assert!(!store.remove(&key)?);
    assert_eq!(store.load(&key), None);
    Ok(())
}

#[test]
fn store_file_is_pretty_json_keyed_by_digest() -> Result<()> {
    let dir = temp_store_dir();
    let path = dir.path().join("nested").join("conjure_store.json");
    let store = FileStore::open(&path);
    store.archive("fibonacci", FIB_SIGNATURE, FIB_SOURCE)?;

    let text = fs::read_to_string(&path)?;
    assert!(text.starts_with("{\n  \""));
    assert!(text.ends_with("}\n"));

    let document: serde_json::Value = serde_json::from_str(&text)?;
    let key = CacheKey::derive("fibonacci", FIB_SIGNATURE);
    assert_eq!(document[key.as_str()], serde_json::Value::from(FIB_SOURCE));
    Ok(())
}
