use anyhow::{Context, Result};
use askagent_core::{
    Agent, Config, ConfigLoader, TelemetryOptions, init_telemetry,
    metrics::init_metrics_from_env, optional_env, persist_trace,
};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "askagent-cli",
    version,
    about = "Ask the agent a question from the terminal"
)]
struct Cli {
    /// Path to a TOML config file (defaults to `ASKAGENT_CONFIG` or `askagent.toml`).
    #[arg(long, global = true, env = "ASKAGENT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a single question.
    Ask(AskArgs),
    /// Load the configuration and report what the agent would use.
    CheckConfig,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Question to answer. May be omitted when `--document` is given.
    #[arg(long, short, default_value = "")]
    question: String,

    /// Plain-text file to attach as document context.
    #[arg(long)]
    document: Option<PathBuf>,

    /// Print the full response as JSON instead of the answer text.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Print a markdown summary of the executed steps.
    #[arg(long, default_value_t = false)]
    explain: bool,

    /// Persist the step trace as JSON into this directory.
    #[arg(long)]
    trace_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load(cli.config.clone())?;

    init_telemetry(TelemetryOptions {
        env_filter: std::env::var("RUST_LOG")
            .ok()
            .or_else(|| Some(format!("warn,askagent_core={}", config.logging.level))),
        ..TelemetryOptions::default()
    })?;
    init_metrics_from_env("askagent-cli")?;

    match cli.command {
        Command::Ask(args) => {
            let rt = Runtime::new()?;
            rt.block_on(ask_command(config, args))
        }
        Command::CheckConfig => check_config_command(&config),
    }
}

async fn ask_command(config: Config, args: AskArgs) -> Result<()> {
    let document = match &args.document {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read document {}", path.display()))?,
        ),
        None => None,
    };

    let agent = Agent::from_config(config)?;
    info!(question = %args.question, document = document.is_some(), "asking agent");

    let outcome = agent
        .run_with_report(&args.question, document.as_deref())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.response)?);
    } else {
        println!("{}", outcome.response.answer);
        if let Some(sources) = &outcome.response.sources {
            println!("\nSources:");
            for (idx, source) in sources.iter().enumerate() {
                println!("[{}] {} ({})", idx + 1, source.title, source.url);
            }
        }
    }

    if args.explain {
        println!("\n{}", outcome.trace_summary().render_markdown());
    }

    if let Some(dir) = &args.trace_dir {
        let path = persist_trace(dir, &outcome.request_id, &outcome.trace_events)?;
        println!("\nTrace written to {}", path.display());
    }

    Ok(())
}

fn check_config_command(config: &Config) -> Result<()> {
    let llm_key = if optional_env(&config.llm.api_key_env).is_some() {
        "set"
    } else {
        "missing"
    };
    let search_key = if config.search_api_key().is_some() {
        "set"
    } else {
        "missing (search disabled)"
    };

    println!("llm: {} / {}", config.llm.provider, config.llm.model);
    println!("  {}: {}", config.llm.api_key_env, llm_key);
    if let Some(base_url) = &config.llm.base_url {
        println!("  base_url: {base_url}");
    }
    println!("search: {:?}", config.search.provider);
    println!("  {}: {}", config.search.api_key_env, search_key);
    println!(
        "  max_results: {}, hard_limit: {}",
        config.search.max_results, config.search.hard_limit
    );
    println!(
        "research: budget {}, stop above {} chars",
        config.research.iteration_budget, config.research.answer_length_threshold
    );
    println!(
        "capabilities: {}",
        if config.capabilities.enabled {
            format!("on ({} rounds)", config.capabilities.max_rounds)
        } else {
            "off".to_string()
        }
    );

    if llm_key == "missing" {
        anyhow::bail!(
            "{} is not set; `ask` cannot reach the model",
            config.llm.api_key_env
        );
    }
    Ok(())
}
