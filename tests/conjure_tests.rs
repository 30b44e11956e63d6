use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use conjure::cache::{CacheKey, FileStore, ImplementationStore, MemoryStore};
use conjure::generator::GenerationError;
use conjure::identity::{FunctionSpec, IdentityMode, ParamSpec};
use conjure::runtime::{MaterializationError, Value};
use conjure::{ConjureError, Conjurer};

const FIB_SOURCE: &str =
    "def fibonacci(n: int) -> int:\n    return n if n < 2 else fibonacci(n-1) + fibonacci(n-2)";

fn fibonacci_spec() -> FunctionSpec {
    FunctionSpec::new("fibonacci")
        .param(ParamSpec::new("n").annotated("int"))
        .returns("int")
        .doc("Returns the nth Fibonacci number.")
}

fn temp_store(dir: &Path) -> FileStore {
    FileStore::open(dir.join("conjure_store.json"))
}

/// A generator that replies with `reply` and counts how often it is asked.
fn counting_generator(
    reply: &'static str,
) -> (
    Arc<AtomicUsize>,
    impl Fn(&str, &str, Option<&str>) -> Result<String, GenerationError> + Send + Sync + 'static,
) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let generator = move |_: &str, _: &str, _: Option<&str>| -> Result<String, GenerationError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(reply.to_string())
    };
    (calls, generator)
}

fn refusing_generator(_: &str, _: &str, _: Option<&str>) -> Result<String, GenerationError> {
    Err(GenerationError::Transport("connection refused".to_string()))
}

#[test]
fn cold_call_generates_and_archives() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (calls, generator) = counting_generator(FIB_SOURCE);
    let conjurer = Conjurer::new(temp_store(dir.path()), generator);

    let fibonacci = conjurer.wrap(fibonacci_spec());
    assert_eq!(fibonacci.call(vec![Value::Int(10)]), Value::Int(55));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let entries = temp_store(dir.path()).entries();
    assert_eq!(entries.len(), 1);
    let key = CacheKey::derive("fibonacci", "(n: int) -> int");
    assert_eq!(entries.get(key.as_str()).map(String::as_str), Some(FIB_SOURCE));
    Ok(())
}

#[test]
fn warm_call_never_asks_the_generator() -> Result<()> {
    let dir = tempfile::tempdir()?;
    temp_store(dir.path()).archive("fibonacci", "(n: int) -> int", FIB_SOURCE)?;

    let generator = |_: &str, _: &str, _: Option<&str>| -> Result<String, GenerationError> {
        panic!("the generator must not be called on a warm store")
    };
    let conjurer = Conjurer::new(temp_store(dir.path()), generator);
    let fibonacci = conjurer.wrap(fibonacci_spec());

    assert_eq!(fibonacci.try_call(vec![Value::Int(10)])?, Value::Int(55));
    assert_eq!(conjurer.stats().hits, 1);
    assert_eq!(conjurer.stats().misses, 0);
    Ok(())
}

#[test]
fn fenced_replies_are_stored_without_fences() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let transport = |_: &str, _: &[conjure::generator::ChatMessage]| -> Result<String, GenerationError> {
        Ok(format!("```python\n{FIB_SOURCE}\n```"))
    };
    let generator = conjure::ModelGenerator::new(transport, "test-model");
    let conjurer = Conjurer::new(temp_store(dir.path()), generator);

    assert_eq!(
        conjurer.wrap(fibonacci_spec()).try_call(vec![Value::Int(7)])?,
        Value::Int(13)
    );
    let stored = conjurer
        .cached_source(&fibonacci_spec())
        .expect("implementation should be archived");
    assert!(!stored.contains("```"));
    assert_eq!(stored, FIB_SOURCE);
    Ok(())
}

#[test]
fn generation_failure_returns_the_sentinel_and_writes_nothing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conjurer = Conjurer::new(temp_store(dir.path()), refusing_generator);
    let fibonacci = conjurer.wrap(fibonacci_spec());

    assert_eq!(fibonacci.call(vec![Value::Int(10)]), Value::None);
    assert!(!dir.path().join("conjure_store.json").exists());

    match fibonacci.try_call(vec![Value::Int(10)]) {
        Err(ConjureError::Generation(GenerationError::Transport(message))) => {
            assert_eq!(message, "connection refused");
        }
        other => panic!("expected a generation error, got {other:?}"),
    }
    assert_eq!(conjurer.stats().generation_failures, 2);
    Ok(())
}

#[test]
fn malformed_entries_fail_until_forgotten() -> Result<()> {
    let dir = tempfile::tempdir()?;
    temp_store(dir.path()).archive("fibonacci", "(n: int) -> int", "def fibonacci(n: int) -> int\n    return (\n")?;

    let (calls, generator) = counting_generator(FIB_SOURCE);
    let conjurer = Conjurer::new(temp_store(dir.path()), generator);
    let fibonacci = conjurer.wrap(fibonacci_spec());

    for _ in 0..3 {
        assert_eq!(fibonacci.call(vec![Value::Int(10)]), Value::None);
    }
    assert!(matches!(
        fibonacci.try_call(vec![Value::Int(10)]),
        Err(ConjureError::Materialization(MaterializationError::Syntax { .. }))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(conjurer.forget(&fibonacci_spec())?);
    assert_eq!(fibonacci.call(vec![Value::Int(10)]), Value::Int(55));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn identities_are_deterministic_and_signature_sensitive() {
    let first = fibonacci_spec().identity(IdentityMode::Signature);
    let again = fibonacci_spec().identity(IdentityMode::Signature);
    assert_eq!(first, again);
    assert_eq!(first.signature, "(n: int) -> int");

    let floats = FunctionSpec::new("fibonacci")
        .param(ParamSpec::new("n").annotated("float"))
        .returns("int")
        .identity(IdentityMode::Signature);
    assert_ne!(first.key, floats.key);

    let renamed = FunctionSpec::new("fib")
        .param(ParamSpec::new("n").annotated("int"))
        .returns("int")
        .identity(IdentityMode::Signature);
    assert_ne!(first.key, renamed.key);
}

#[test]
fn docstrings_only_matter_in_documented_mode() {
    let edited = FunctionSpec::new("fibonacci")
        .param(ParamSpec::new("n").annotated("int"))
        .returns("int")
        .doc("Returns the nth Fibonacci number, starting from 1.");

    assert_eq!(
        fibonacci_spec().identity(IdentityMode::Signature).key,
        edited.identity(IdentityMode::Signature).key
    );
    assert_ne!(
        fibonacci_spec().identity(IdentityMode::Documented).key,
        edited.identity(IdentityMode::Documented).key
    );
}

#[test]
fn documented_mode_regenerates_after_a_docstring_edit() -> Result<()> {
    let (calls, generator) = counting_generator(FIB_SOURCE);
    let conjurer = Conjurer::new(MemoryStore::new(), generator)
        .with_identity_mode(IdentityMode::Documented);

    let original = conjurer.wrap(fibonacci_spec());
    assert_eq!(original.try_call(vec![Value::Int(6)])?, Value::Int(8));
    assert_eq!(original.try_call(vec![Value::Int(6)])?, Value::Int(8));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let edited = conjurer.wrap(fibonacci_spec().doc("Fibonacci, zero-indexed."));
    assert_eq!(edited.try_call(vec![Value::Int(6)])?, Value::Int(8));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn stubs_parsed_from_source_share_identities_with_built_specs() -> Result<()> {
    let spec = FunctionSpec::parse_stub(
        "def fibonacci(n: int) -> int:\n    \"\"\"Returns the nth Fibonacci number.\"\"\"\n    pass\n",
    )?;
    assert_eq!(spec.docstring(), Some("Returns the nth Fibonacci number."));
    assert_eq!(
        spec.identity(IdentityMode::Documented),
        fibonacci_spec().identity(IdentityMode::Documented)
    );
    Ok(())
}

#[test]
fn clones_share_store_and_statistics() -> Result<()> {
    let (calls, generator) = counting_generator(FIB_SOURCE);
    let conjurer = Conjurer::new(MemoryStore::new(), generator);
    let worker = conjurer.clone();

    assert_eq!(worker.wrap(fibonacci_spec()).try_call(vec![Value::Int(5)])?, Value::Int(5));
    assert_eq!(conjurer.wrap(fibonacci_spec()).try_call(vec![Value::Int(5)])?, Value::Int(5));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(conjurer.stats().hits, 1);
    assert!(conjurer.store().load(&conjurer.identity(&fibonacci_spec()).key).is_some());
    Ok(())
}

#[test]
fn unwritable_store_still_returns_the_result() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // A regular file where the store's directory should be.
    let blocker = dir.path().join("not_a_directory");
    std::fs::write(&blocker, "")?;
    let store = FileStore::open(blocker.join("conjure_store.json"));

    let (calls, generator) = counting_generator(FIB_SOURCE);
    let conjurer = Conjurer::new(store, generator);
    let fibonacci = conjurer.wrap(fibonacci_spec());

    assert_eq!(fibonacci.call(vec![Value::Int(10)]), Value::Int(55));
    assert_eq!(conjurer.stats().archive_failures, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing was archived, so the next call asks again.
    assert_eq!(fibonacci.call(vec![Value::Int(10)]), Value::Int(55));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(conjurer.stats().archive_failures, 2);
    assert_eq!(conjurer.stats().hits, 0);
    Ok(())
}
