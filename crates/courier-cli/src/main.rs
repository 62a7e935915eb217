//! Courier CLI - run functions through the assignment runtime.
//!
//! Functions are served by an in-process local executor, so every run goes
//! through the same lifecycle (`ASSIGN`, `YIELD`, `DONE` and the error
//! kinds) that a remote broker would produce.
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`COURIER_*`)
//! 3. Project config (`.courier/config.toml` in the project root)
//! 4. Global config (`~/.courier/config.toml`)
//! 5. Default values (lowest priority)
//!
//! # Examples
//!
//! ```text
//! courier run add-one --arg x=41
//! courier run count --arg n=3 --events
//! courier -C ./project config
//! ```

mod demo;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courier_event::Target;
use courier_runtime::{
    CallOptions, Caller, ConfigLoader, CourierConfig, InProcessSupervisor, LocalExecutor, Returns,
    Template,
};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Template id of the single local actor a run spawns.
const TEMPLATE_ID: &str = "cli";

/// Courier CLI - run functions through the assignment runtime
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long)]
    project: Option<PathBuf>,

    /// Ignore the global config file (~/.courier/config.toml)
    #[arg(long)]
    no_global_config: bool,

    /// Override the call timeout in milliseconds (also: COURIER_CALL_TIMEOUT_MS)
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a function and print each yielded value as a JSON line
    Run {
        /// Function interface (see `courier list`)
        function: String,

        /// Keyword argument as KEY=VALUE; VALUE is parsed as JSON, falling
        /// back to a plain string
        #[arg(short, long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,

        /// Print every lifecycle event instead of only the yields
        #[arg(long)]
        events: bool,
    },
    /// List the available functions
    List,
    /// Print the resolved configuration as TOML
    Config,
}

/// CLI-based configuration resolver.
///
/// Merges file/env config via [`ConfigLoader`] and applies CLI argument
/// overrides as the highest-priority layer.
struct CliConfigResolver {
    project_root: PathBuf,
    debug: bool,
    skip_global: bool,
    timeout_ms: Option<u64>,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        let project_root = args
            .project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        Self {
            project_root,
            debug: args.debug,
            skip_global: args.no_global_config,
            timeout_ms: args.timeout_ms,
        }
    }

    fn resolve(&self) -> Result<CourierConfig> {
        let mut loader = ConfigLoader::new().with_project_root(&self.project_root);
        if self.skip_global {
            loader = loader.skip_global_config();
        }
        let mut config = loader.load().context("failed to load configuration")?;

        if self.debug {
            config.debug = true;
        }
        if let Some(ms) = self.timeout_ms {
            config.call.timeout_ms = Some(ms);
        }
        Ok(config)
    }
}

/// Parses `KEY=VALUE` pairs into keyword arguments.
fn parse_kwargs(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut kwargs = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("argument '{pair}' is not KEY=VALUE");
        };
        if key.is_empty() {
            bail!("argument '{pair}' has an empty key");
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        kwargs.insert(key.to_string(), value);
    }
    Ok(kwargs)
}

/// Renders a yield payload as one JSON line, unpacked like a call result.
fn render_returns(returns: Vec<Value>) -> Result<String> {
    Ok(serde_json::to_string(&Returns(returns).into_value())?)
}

async fn run(
    config: &CourierConfig,
    function: &str,
    kwargs: Map<String, Value>,
    events: bool,
) -> Result<()> {
    let registry = demo::registry();
    if registry.get(function).is_none() {
        bail!(
            "unknown function '{function}' (available: {})",
            registry.interfaces().join(", ")
        );
    }

    let supervisor = InProcessSupervisor::new(registry);
    let template = Template::new(TEMPLATE_ID, function);
    let executor = LocalExecutor::enter(&supervisor, template, config.local)
        .await
        .context("failed to start local executor")?;

    let outcome = if events {
        print_events(&executor, kwargs, config.call.timeout()).await
    } else {
        let caller = Caller::new(Arc::new(executor.clone()))
            .with_default_timeout(config.call.timeout());
        print_yields(&caller, kwargs).await
    };
    executor.exit().await;
    outcome
}

async fn print_events(
    executor: &LocalExecutor,
    kwargs: Map<String, Value>,
    timeout: Option<Duration>,
) -> Result<()> {
    let mut stream = executor.iterate(kwargs, None).await?;
    if let Some(timeout) = timeout {
        stream = stream.with_timeout(timeout);
    }
    info!(assignation = %stream.assignation(), "streaming events");
    while let Some(item) = stream.next().await {
        let event = item?;
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

async fn print_yields(caller: &Caller, kwargs: Map<String, Value>) -> Result<()> {
    let target = Target::Template(TEMPLATE_ID.into());
    let mut yields = caller
        .iterate_raw(target, kwargs, CallOptions::default())
        .await?;
    while let Some(item) = yields.next().await {
        println!("{}", render_returns(item?)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let resolver = CliConfigResolver::from_args(&args);
    let config = resolver.resolve()?;

    // Terminal filter: --debug (or COURIER_DEBUG) > RUST_LOG env > default "warn"
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    debug!(path = %resolver.project_root.display(), "Project root");

    match args.command {
        Command::Run {
            function,
            args,
            events,
        } => {
            let kwargs = parse_kwargs(&args)?;
            run(&config, &function, kwargs, events).await
        }
        Command::List => {
            for name in demo::registry().interfaces() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kwargs_parse_json_with_string_fallback() {
        let kwargs = parse_kwargs(&[
            "x=41".to_string(),
            "name=alice".to_string(),
            "tags=[1,2]".to_string(),
        ])
        .expect("parse");
        assert_eq!(kwargs["x"], json!(41));
        assert_eq!(kwargs["name"], json!("alice"));
        assert_eq!(kwargs["tags"], json!([1, 2]));
    }

    #[test]
    fn kwargs_reject_missing_separator() {
        assert!(parse_kwargs(&["x".to_string()]).is_err());
        assert!(parse_kwargs(&["=1".to_string()]).is_err());
    }

    #[test]
    fn yield_payloads_unpack_single_values() {
        assert_eq!(render_returns(vec![json!(42)]).expect("render"), "42");
        assert_eq!(
            render_returns(vec![json!(1), json!("a")]).expect("render"),
            r#"[1,"a"]"#
        );
        assert_eq!(render_returns(vec![]).expect("render"), "[]");
    }

    #[test]
    fn cli_overrides_win_over_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = CliConfigResolver {
            project_root: dir.path().to_path_buf(),
            debug: true,
            skip_global: true,
            timeout_ms: Some(250),
        };
        let config = resolver.resolve().expect("resolve");
        assert!(config.debug);
        assert_eq!(config.call.timeout_ms, Some(250));
    }
}
