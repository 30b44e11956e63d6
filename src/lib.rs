//! Placeholder functions whose bodies are written by a language model on first
//! call, stored on disk by identity, and reused on every later call.

pub mod ast;
pub mod cache;
pub mod cli;
pub mod config;
pub mod conjure;
pub mod freeze;
pub mod generator;
pub mod identity;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod utils;

pub use cache::{CacheKey, FileStore, ImplementationStore, MemoryStore};
pub use config::Config;
pub use conjure::{ConjureError, ConjureStats, ConjuredFn, Conjurer};
pub use freeze::{freeze, FrozenModule};
pub use generator::{GenerationError, Generator, ModelGenerator, OllamaTransport};
pub use identity::{FunctionSpec, Identity, IdentityMode, ParamSpec};
pub use runtime::{ExecutionLimits, MaterializationError, Module, RuntimeError, Value};
