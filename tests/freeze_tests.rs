use anyhow::Result;
use conjure::cache::{ImplementationStore, MemoryStore};
use conjure::freeze::{freeze, MISSING_MARKER};
use conjure::identity::{FunctionSpec, IdentityMode, StubError};
use conjure::runtime::{ExecutionLimits, Module, Value};
use conjure::ConjureError;

const STUBS: &str = "\
import math

def fibonacci(n: int) -> int:
    \"\"\"Returns the nth Fibonacci number.\"\"\"
    pass

def hypotenuse(a: float, b: float) -> float:
    ...

def double(x):
    return 2 * x

if __name__ == '__main__':
    print(fibonacci(10))
";

const FIB_SOURCE: &str =
    "def fibonacci(n: int) -> int:\n    return n if n < 2 else fibonacci(n-1) + fibonacci(n-2)\n";

fn archive(store: &MemoryStore, stub_name: &str, source: &str) -> Result<()> {
    let spec = FunctionSpec::stubs_in("<test>", STUBS)?
        .into_iter()
        .find(|spec| spec.name() == stub_name)
        .expect("stub should be declared");
    store.save(&spec.identity(IdentityMode::Signature).key, source)?;
    Ok(())
}

#[test]
fn stored_implementations_replace_their_stubs() -> Result<()> {
    let store = MemoryStore::new();
    archive(&store, "fibonacci", FIB_SOURCE)?;
    archive(
        &store,
        "hypotenuse",
        "import math\n\ndef hypotenuse(a: float, b: float) -> float:\n    return math.sqrt(a * a + b * b)\n",
    )?;

    let frozen = freeze("stubs.py", STUBS, &store, IdentityMode::Signature)?;
    assert_eq!(frozen.frozen, ["fibonacci", "hypotenuse"]);
    assert!(frozen.missing.is_empty());
    assert!(frozen.text.starts_with("# Frozen from stubs.py\n"));
    assert!(frozen.text.contains("fibonacci(n-1) + fibonacci(n-2)"));
    assert!(!frozen.text.contains("    pass\n"));
    assert!(frozen.text.contains("def double(x):\n    return 2 * x\n"));

    // The frozen file runs on its own.
    let module = Module::load("<frozen>", &frozen.text, ExecutionLimits::default())?;
    assert_eq!(
        module.call("fibonacci", vec![Value::Int(10)], vec![])?,
        Value::Int(55)
    );
    assert_eq!(
        module.call("hypotenuse", vec![Value::Float(3.0), Value::Float(4.0)], vec![])?,
        Value::Float(5.0)
    );
    Ok(())
}

#[test]
fn missing_implementations_are_marked_and_kept() -> Result<()> {
    let store = MemoryStore::new();
    archive(&store, "fibonacci", FIB_SOURCE)?;

    let frozen = freeze("stubs.py", STUBS, &store, IdentityMode::Signature)?;
    assert_eq!(frozen.frozen, ["fibonacci"]);
    assert_eq!(frozen.missing, ["hypotenuse"]);
    assert!(frozen.text.contains(&format!(
        "{MISSING_MARKER}\ndef hypotenuse(a: float, b: float) -> float:\n    ...\n"
    )));
    Ok(())
}

#[test]
fn surrounding_code_is_preserved_in_order() -> Result<()> {
    let frozen = freeze("stubs.py", STUBS, &MemoryStore::new(), IdentityMode::Signature)?;
    let import = frozen.text.find("import math").expect("import kept");
    let double = frozen.text.find("def double").expect("implemented function kept");
    let guard = frozen.text.find("if __name__").expect("main guard kept");
    assert!(import < double && double < guard);
    assert_eq!(frozen.missing, ["fibonacci", "hypotenuse"]);
    Ok(())
}

#[test]
fn identity_mode_selects_the_entries() -> Result<()> {
    let store = MemoryStore::new();
    archive(&store, "fibonacci", FIB_SOURCE)?;

    let frozen = freeze("stubs.py", STUBS, &store, IdentityMode::Documented)?;
    assert!(frozen.frozen.is_empty());
    assert_eq!(frozen.missing.len(), 2);
    Ok(())
}

#[test]
fn unparseable_sources_are_rejected() {
    let result = freeze(
        "broken.py",
        "def broken(:\n    pass\n",
        &MemoryStore::new(),
        IdentityMode::Signature,
    );
    assert!(matches!(
        result,
        Err(ConjureError::Stub(StubError::Syntax { .. }))
    ));
}
