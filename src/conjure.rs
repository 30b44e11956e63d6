//! The interception wrapper: identify, look up, generate on a miss, materialize, dispatch.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{FileStore, ImplementationStore, StoreError};
use crate::config::Config;
use crate::generator::{GenerationError, Generator, ModelGenerator};
use crate::identity::{FunctionSpec, Identity, IdentityMode, StubError};
use crate::runtime::{ExecutionLimits, MaterializationError, Module, RuntimeError, Value};

#[derive(Debug, Error)]
pub enum ConjureError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("materialization failed: {0}")]
    Materialization(#[from] MaterializationError),
    #[error("store update failed: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Stub(#[from] StubError),
}

/// Counters over every resolution performed through one `Conjurer` and its clones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConjureStats {
    pub hits: u64,
    pub misses: u64,
    pub generated: u64,
    pub generation_failures: u64,
    pub materialization_failures: u64,
    pub archive_failures: u64,
}

/// Resolves declarations to implementations through a store and a generator.
///
/// Clones share the store, the generator and the statistics.
#[derive(Clone)]
pub struct Conjurer {
    store: Arc<dyn ImplementationStore>,
    generator: Arc<dyn Generator>,
    limits: ExecutionLimits,
    mode: IdentityMode,
    stats: Arc<Mutex<ConjureStats>>,
}

impl Conjurer {
    pub fn new(
        store: impl ImplementationStore + 'static,
        generator: impl Generator + 'static,
    ) -> Self {
        Self {
            store: Arc::new(store),
            generator: Arc::new(generator),
            limits: ExecutionLimits::default(),
            mode: IdentityMode::default(),
            stats: Arc::new(Mutex::new(ConjureStats::default())),
        }
    }

    /// A file store and an Ollama-backed generator as described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let store = FileStore::open(config.store_path.clone());
        let generator = ModelGenerator::ollama(&config.endpoint, &config.model, config.timeout());
        Self::new(store, generator)
            .with_limits(config.limits)
            .with_identity_mode(config.identity)
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_identity_mode(mut self, mode: IdentityMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn identity_mode(&self) -> IdentityMode {
        self.mode
    }

    pub fn store(&self) -> &dyn ImplementationStore {
        self.store.as_ref()
    }

    pub fn stats(&self) -> ConjureStats {
        *self.stats.lock()
    }

    pub fn identity(&self, spec: &FunctionSpec) -> Identity {
        spec.identity(self.mode)
    }

    /// The stored text for `spec`, without generating anything.
    pub fn cached_source(&self, spec: &FunctionSpec) -> Option<String> {
        self.store.load(&self.identity(spec).key)
    }

    pub fn wrap(&self, spec: FunctionSpec) -> ConjuredFn {
        ConjuredFn {
            conjurer: self.clone(),
            spec,
        }
    }

    /// Removes the stored implementation so the next call generates afresh.
    pub fn forget(&self, spec: &FunctionSpec) -> Result<bool, ConjureError> {
        let identity = self.identity(spec);
        let removed = self.store.remove(&identity.key)?;
        info!(name = %identity.name, key = %identity.key, removed, "forgot implementation");
        Ok(removed)
    }

    /// Finds or generates the text for `spec` and materializes it. The returned
    /// module is guaranteed to bind a callable under the declared name.
    pub fn resolve(&self, spec: &FunctionSpec) -> Result<Module, ConjureError> {
        let identity = self.identity(spec);
        let source = match self.store.load(&identity.key) {
            Some(source) => {
                debug!(name = %identity.name, key = %identity.key, "store hit");
                self.stats.lock().hits += 1;
                source
            }
            None => {
                self.stats.lock().misses += 1;
                self.generate(&identity, spec)?
            }
        };
        self.materialize(&identity, &source)
    }

    fn generate(&self, identity: &Identity, spec: &FunctionSpec) -> Result<String, ConjureError> {
        info!(name = %identity.name, signature = %identity.signature, "cold miss, generating");
        let source = self
            .generator
            .generate(&identity.name, &identity.signature, spec.docstring())
            .inspect_err(|err| {
                self.stats.lock().generation_failures += 1;
                warn!(name = %identity.name, error = %err, "generation failed");
            })?;
        self.stats.lock().generated += 1;

        if let Err(err) = self.store.save(&identity.key, &source) {
            self.stats.lock().archive_failures += 1;
            error!(
                name = %identity.name,
                error = %err,
                "could not archive generated implementation; it will be regenerated next run"
            );
        }
        Ok(source)
    }

    fn materialize(&self, identity: &Identity, source: &str) -> Result<Module, ConjureError> {
        let source_id = format!("<conjured {}>", identity.name);
        let loaded = Module::load(&source_id, source, self.limits)
            .and_then(|module| module.function(&identity.name).map(|_| module));
        loaded.map_err(|err| {
            self.stats.lock().materialization_failures += 1;
            warn!(name = %identity.name, key = %identity.key, error = %err, "materialization failed");
            ConjureError::from(err)
        })
    }
}

/// A declaration bound to a `Conjurer`, callable like the function it declares.
pub struct ConjuredFn {
    conjurer: Conjurer,
    spec: FunctionSpec,
}

impl ConjuredFn {
    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Calls the implementation, returning `Value::None` on any failure.
    pub fn call(&self, args: Vec<Value>) -> Value {
        self.call_with(args, Vec::new())
    }

    pub fn call_with(&self, args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Value {
        match self.try_call_with(args, kwargs) {
            Ok(value) => value,
            Err(err) => {
                warn!(name = %self.name(), error = %err, "conjured call failed");
                Value::None
            }
        }
    }

    pub fn try_call(&self, args: Vec<Value>) -> Result<Value, ConjureError> {
        self.try_call_with(args, Vec::new())
    }

    /// Like `call_with`, but failures and exceptions raised by the
    /// implementation reach the caller.
    pub fn try_call_with(
        &self,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ConjureError> {
        let module = self.conjurer.resolve(&self.spec)?;
        Ok(module.call(self.spec.name(), args, kwargs)?)
    }

    pub fn into_fn(self) -> Box<dyn Fn(Vec<Value>) -> Value> {
        Box::new(move |args| self.call(args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::identity::ParamSpec;

    fn square_spec() -> FunctionSpec {
        FunctionSpec::new("square")
            .param(ParamSpec::new("x").annotated("int"))
            .returns("int")
    }

    fn square_generator(
        _: &str,
        _: &str,
        _: Option<&str>,
    ) -> Result<String, GenerationError> {
        Ok("def square(x: int) -> int:\n    return x * x\n".to_string())
    }

    #[test]
    fn second_call_hits_the_store() {
        let conjurer = Conjurer::new(MemoryStore::new(), square_generator);
        let square = conjurer.wrap(square_spec());
        assert_eq!(square.call(vec![Value::Int(7)]), Value::Int(49));
        assert_eq!(square.call(vec![Value::Int(3)]), Value::Int(9));

        let stats = conjurer.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.generated, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn wrong_symbol_is_a_materialization_error() {
        let generator = |_: &str, _: &str, _: Option<&str>| -> Result<String, GenerationError> {
            Ok("def cube(x):\n    return x ** 3\n".to_string())
        };
        let conjurer = Conjurer::new(MemoryStore::new(), generator);
        let result = conjurer.wrap(square_spec()).try_call(vec![Value::Int(2)]);
        assert!(matches!(
            result,
            Err(ConjureError::Materialization(MaterializationError::MissingSymbol { .. }))
        ));
        assert_eq!(conjurer.stats().materialization_failures, 1);
    }

    #[test]
    fn raised_exceptions_propagate_from_try_call() {
        let generator = |_: &str, _: &str, _: Option<&str>| -> Result<String, GenerationError> {
            Ok("def square(x: int) -> int:\n    raise ValueError('negative')\n".to_string())
        };
        let conjurer = Conjurer::new(MemoryStore::new(), generator);
        let square = conjurer.wrap(square_spec());
        match square.try_call(vec![Value::Int(-1)]) {
            Err(ConjureError::Runtime(err)) => assert_eq!(err.to_string(), "ValueError: negative"),
            other => panic!("expected a runtime error, got {other:?}"),
        }
        assert_eq!(square.call(vec![Value::Int(-1)]), Value::None);
    }

    #[test]
    fn boxed_closures_keep_the_call_interface() {
        let conjurer = Conjurer::new(MemoryStore::new(), square_generator);
        let square = conjurer.wrap(square_spec()).into_fn();
        assert_eq!(square(vec![Value::Int(12)]), Value::Int(144));
    }
}
