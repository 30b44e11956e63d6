use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::cache::{FileStore, ImplementationStore};
use crate::config::Config;
use crate::conjure::{ConjureError, Conjurer};
use crate::freeze::freeze;
use crate::identity::{FunctionSpec, IdentityMode, StubError};
use crate::runtime::{eval_expression, MaterializationError, Value};
use crate::utils::errors::emit_diagnostics;
use crate::utils::logger;

#[derive(Parser, Debug)]
#[command(
    name = "conjure",
    version,
    about = "Call placeholder functions whose bodies a language model writes once and the store remembers"
)]
pub struct ConjureCli {
    #[arg(long, global = true, value_name = "PATH")]
    /// Implementation store to use instead of `conjure_store.json`.
    store: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Model that generates missing implementations.
    model: Option<String>,

    #[arg(long, global = true, value_name = "URL")]
    /// Base URL of the Ollama server.
    endpoint: Option<String>,

    #[arg(long, global = true)]
    /// Include docstrings in identities, so editing one regenerates the function.
    documented_identity: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Calls a stub declared in a file, generating its body on first use.
    #[command(allow_negative_numbers = true)]
    Call {
        path: PathBuf,
        function: String,
        /// Positional arguments, each a literal expression such as `10` or `'abc'`.
        args: Vec<String>,
        /// Keyword argument as NAME=EXPR; repeatable.
        #[arg(long = "kw", value_name = "NAME=EXPR")]
        kwargs: Vec<String>,
    },
    /// Lists the stubs in a file with their identities and whether they are stored.
    Inspect { path: PathBuf },
    /// Removes the stored implementation of one stub.
    Forget { path: PathBuf, function: String },
    /// Writes a copy of the file with stored implementations in place of the stubs.
    Freeze {
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl ConjureCli {
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Configuration after applying command line overrides.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::load().context("invalid configuration")?;
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if self.documented_identity {
            config.identity = IdentityMode::Documented;
        }
        Ok(config)
    }
}

pub fn run() -> Result<()> {
    logger::init_logging();
    let cli = ConjureCli::parse();
    let config = cli.config()?;
    debug!(?config, "resolved configuration");

    match &cli.command {
        Command::Call {
            path,
            function,
            args,
            kwargs,
        } => handle_call(&config, path, function, args, kwargs),
        Command::Inspect { path } => handle_inspect(&config, path),
        Command::Forget { path, function } => handle_forget(&config, path, function),
        Command::Freeze { path, output } => handle_freeze(&config, path, output.clone()),
    }
}

fn handle_call(
    config: &Config,
    path: &Path,
    function: &str,
    args: &[String],
    kwargs: &[String],
) -> Result<()> {
    let source = read_source(path)?;
    let spec = find_stub(path, &source, function)?;

    let args = args
        .iter()
        .map(|arg| parse_argument(config, arg))
        .collect::<Result<Vec<_>>>()?;
    let kwargs = kwargs
        .iter()
        .map(|pair| {
            let (name, expr) = pair
                .split_once('=')
                .with_context(|| format!("keyword argument `{pair}` is not NAME=EXPR"))?;
            Ok((name.trim().to_string(), parse_argument(config, expr)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let conjurer = Conjurer::from_config(config);
    let spinner = conjurer
        .cached_source(&spec)
        .is_none()
        .then(|| generation_spinner(spec.name(), &config.model))
        .transpose()?;

    let result = conjurer.wrap(spec).try_call_with(args, kwargs);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(value) => {
            println!("{}", value.repr());
            Ok(())
        }
        Err(ConjureError::Materialization(MaterializationError::Syntax { diagnostics, text })) => {
            emit_diagnostics(&diagnostics, &text);
            bail!("materialization failed");
        }
        Err(err) => Err(err).with_context(|| format!("calling `{function}` failed")),
    }
}

fn handle_inspect(config: &Config, path: &Path) -> Result<()> {
    let source = read_source(path)?;
    let stubs = parse_stubs(path, &source)?;
    if stubs.is_empty() {
        println!("{}", "no stubs found".yellow());
        return Ok(());
    }

    let store = FileStore::open(&config.store_path);
    for spec in &stubs {
        let identity = spec.identity(config.identity);
        let status = match store.load(&identity.key) {
            Some(_) => "stored".green().bold(),
            None => "not generated".yellow().bold(),
        };
        println!("{}{}", identity.name.bold(), identity.signature);
        println!("  {:<7}{}", "key", identity.key);
        println!("  {:<7}{}", "status", status);
    }
    Ok(())
}

fn handle_forget(config: &Config, path: &Path, function: &str) -> Result<()> {
    let source = read_source(path)?;
    let spec = find_stub(path, &source, function)?;
    let conjurer = Conjurer::from_config(config);
    if conjurer.forget(&spec)? {
        println!("{} {}", "forgot".green().bold(), function);
    } else {
        println!("{} nothing stored for {}", "note:".yellow().bold(), function);
    }
    Ok(())
}

fn handle_freeze(config: &Config, path: &Path, output: Option<PathBuf>) -> Result<()> {
    let source = read_source(path)?;
    let store = FileStore::open(&config.store_path);
    let source_id = path.display().to_string();
    let frozen = match freeze(&source_id, &source, &store, config.identity) {
        Ok(frozen) => frozen,
        Err(ConjureError::Stub(StubError::Syntax { diagnostics })) => {
            emit_diagnostics(&diagnostics, &source);
            bail!("parsing failed");
        }
        Err(err) => return Err(err.into()),
    };

    let output_path = output.unwrap_or_else(|| frozen_path(path));
    if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {}", parent.display()))?;
    }
    fs::write(&output_path, &frozen.text)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    println!(
        "{} {} ({} frozen)",
        "wrote".green().bold(),
        output_path.display(),
        frozen.frozen.len()
    );
    for name in &frozen.missing {
        println!("  {} {name}", "not generated:".yellow());
    }
    Ok(())
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn parse_stubs(path: &Path, source: &str) -> Result<Vec<FunctionSpec>> {
    match FunctionSpec::stubs_in(&path.display().to_string(), source) {
        Ok(stubs) => Ok(stubs),
        Err(StubError::Syntax { diagnostics }) => {
            emit_diagnostics(&diagnostics, source);
            bail!("parsing failed");
        }
        Err(err) => Err(err.into()),
    }
}

fn find_stub(path: &Path, source: &str, function: &str) -> Result<FunctionSpec> {
    parse_stubs(path, source)?
        .into_iter()
        .find(|spec| spec.name() == function)
        .with_context(|| format!("`{function}` is not a stub declared in {}", path.display()))
}

fn parse_argument(config: &Config, text: &str) -> Result<Value> {
    eval_expression("<argument>", text, config.limits)
        .with_context(|| format!("argument `{text}` is not a valid expression"))
}

fn generation_spinner(name: &str, model: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!("{model} is writing {name}..."));
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// `demo.py` becomes `demo_frozen.py` beside it.
fn frozen_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "conjured".to_string());
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "py".to_string());
    path.with_file_name(format!("{stem}_frozen.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frozen_files_sit_beside_their_source() {
        assert_eq!(
            frozen_path(Path::new("demos/fibonacci.py")),
            PathBuf::from("demos/fibonacci_frozen.py")
        );
        assert_eq!(frozen_path(Path::new("stubs")), PathBuf::from("stubs_frozen.py"));
    }
}
