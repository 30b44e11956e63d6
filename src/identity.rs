//! Declarations of conjured functions and the keys derived from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::ast::nodes::{clean_doc, render_param, render_signature, Function};
use crate::cache::CacheKey;
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::runtime::Value;
use crate::utils::errors::{render_diagnostics, Diagnostic};

/// What goes into a cache key besides the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// Name and canonical signature only; editing a docstring reuses the entry.
    #[default]
    Signature,
    /// Also hashes the docstring, so a reworded docstring regenerates.
    Documented,
}

impl FromStr for IdentityMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "signature" => Ok(IdentityMode::Signature),
            "documented" | "doc" => Ok(IdentityMode::Documented),
            other => Err(format!(
                "unknown identity mode '{other}' (expected 'signature' or 'documented')"
            )),
        }
    }
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IdentityMode::Signature => "signature",
            IdentityMode::Documented => "documented",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    name: String,
    annotation: Option<String>,
    default: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
            default: None,
        }
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    /// Default value, rendered with `repr` as it would appear in source.
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into().repr());
        self
    }

    /// Default given as source text, e.g. `"[]"`.
    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default = Some(source.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn annotation(&self) -> Option<&str> {
        self.annotation.as_deref()
    }

    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    fn render(&self) -> String {
        render_param(&self.name, self.annotation(), self.default())
    }
}

/// The declared shape of a function whose body will be synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    name: String,
    params: Vec<ParamSpec>,
    returns: Option<String>,
    doc: Option<String>,
}

/// A resolved identity: the name, its canonical signature, and the store key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub signature: String,
    pub key: CacheKey,
}

#[derive(Debug, Clone, Error)]
pub enum StubError {
    #[error("stub source does not parse:\n{}", render_diagnostics(.diagnostics))]
    Syntax { diagnostics: Vec<Diagnostic> },
    #[error("no function declaration found in stub source")]
    NoDeclaration,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: None,
            doc: None,
        }
    }

    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, annotation: impl Into<String>) -> Self {
        self.returns = Some(annotation.into());
        self
    }

    /// Docstring; indentation is cleaned the way `inspect.cleandoc` does.
    pub fn doc(mut self, doc: impl AsRef<str>) -> Self {
        self.doc = Some(clean_doc(doc.as_ref()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn return_annotation(&self) -> Option<&str> {
        self.returns.as_deref()
    }

    pub fn docstring(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Canonical signature such as `(n: int, k: int = 2) -> int`.
    pub fn signature(&self) -> String {
        let params = self.params.iter().map(ParamSpec::render).collect::<Vec<_>>();
        render_signature(&params, self.return_annotation())
    }

    pub fn identity(&self, mode: IdentityMode) -> Identity {
        let signature = self.signature();
        let key = match mode {
            IdentityMode::Signature => CacheKey::derive(&self.name, &signature),
            IdentityMode::Documented => {
                CacheKey::derive_documented(&self.name, &signature, self.docstring().unwrap_or(""))
            }
        };
        debug!(name = %self.name, %signature, %key, ?mode, "derived identity");
        Identity {
            name: self.name.clone(),
            signature,
            key,
        }
    }

    pub fn from_function(function: &Function) -> Self {
        let params = function
            .params
            .iter()
            .map(|param| ParamSpec {
                name: param.name.clone(),
                annotation: param.ty.as_ref().map(ToString::to_string),
                default: param.default.as_ref().map(ToString::to_string),
            })
            .collect();
        Self {
            name: function.name.clone(),
            params,
            returns: function.ret_ty.as_ref().map(ToString::to_string),
            doc: function.docstring(),
        }
    }

    /// The first function declared in `source`.
    pub fn parse_stub(source: &str) -> Result<Self, StubError> {
        declarations_in("<stub>", source)?
            .into_iter()
            .next()
            .ok_or(StubError::NoDeclaration)
    }

    /// Every top-level declaration in `source` whose body is only a placeholder.
    pub fn stubs_in(source_id: &str, source: &str) -> Result<Vec<Self>, StubError> {
        let functions = parse_functions(source_id, source)?;
        Ok(functions
            .iter()
            .filter(|function| function.is_placeholder())
            .map(Self::from_function)
            .collect())
    }
}

/// Every top-level function declared in `source`, stub or not.
pub fn declarations_in(source_id: &str, source: &str) -> Result<Vec<FunctionSpec>, StubError> {
    let functions = parse_functions(source_id, source)?;
    Ok(functions.iter().map(FunctionSpec::from_function).collect())
}

fn parse_functions(source_id: &str, source: &str) -> Result<Vec<Function>, StubError> {
    let tokens = tokenize(source).map_err(|errors| StubError::Syntax {
        diagnostics: errors.iter().map(|err| err.to_diagnostic(source_id)).collect(),
    })?;
    let program = parse(&tokens).map_err(|errors| StubError::Syntax {
        diagnostics: errors.iter().map(|err| err.to_diagnostic(source_id)).collect(),
    })?;
    Ok(program.functions().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_renders_canonical_signatures() {
        let spec = FunctionSpec::new("fibonacci")
            .param(ParamSpec::new("n").annotated("int"))
            .returns("int");
        assert_eq!(spec.signature(), "(n: int) -> int");

        let spec = FunctionSpec::new("f")
            .param(ParamSpec::new("x"))
            .param(ParamSpec::new("y").with_default(1))
            .param(ParamSpec::new("sep").annotated("str").with_default(", "));
        assert_eq!(spec.signature(), "(x, y=1, sep: str = ', ')");
    }

    #[test]
    fn stub_and_builder_agree() -> Result<(), StubError> {
        let parsed = FunctionSpec::parse_stub(
            "def clamp(value: float, low: float = 0.0, high: float = 1.0) -> float:\n    \"\"\"Clamp value.\"\"\"\n",
        )?;
        let built = FunctionSpec::new("clamp")
            .param(ParamSpec::new("value").annotated("float"))
            .param(ParamSpec::new("low").annotated("float").with_default(0.0))
            .param(ParamSpec::new("high").annotated("float").with_default(1.0))
            .returns("float")
            .doc("Clamp value.");
        assert_eq!(parsed, built);
        assert_eq!(
            parsed.identity(IdentityMode::Signature),
            built.identity(IdentityMode::Signature)
        );
        Ok(())
    }

    #[test]
    fn docstrings_only_count_in_documented_mode() {
        let first = FunctionSpec::new("f").doc("one");
        let second = FunctionSpec::new("f").doc("two");
        assert_eq!(
            first.identity(IdentityMode::Signature).key,
            second.identity(IdentityMode::Signature).key
        );
        assert_ne!(
            first.identity(IdentityMode::Documented).key,
            second.identity(IdentityMode::Documented).key
        );
    }

    #[test]
    fn identity_modes_parse_from_strings() {
        assert_eq!("Documented".parse(), Ok(IdentityMode::Documented));
        assert_eq!("signature".parse(), Ok(IdentityMode::Signature));
        assert!("other".parse::<IdentityMode>().is_err());
    }

    #[test]
    fn stubs_exclude_implemented_functions() -> Result<(), StubError> {
        let source = "def done(x):\n    return x\n\ndef todo(x):\n    ...\n\ndef later():\n    raise NotImplementedError\n";
        let names: Vec<_> = FunctionSpec::stubs_in("<test>", source)?
            .into_iter()
            .map(|spec| spec.name().to_string())
            .collect();
        assert_eq!(names, ["todo", "later"]);
        Ok(())
    }
}
