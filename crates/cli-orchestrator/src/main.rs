use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use orchestrator::{
    correlation::{OPERATION_CONTEXT_KEY, OUTPUT_CONTAINER_KEY},
    naming,
    notification::classify,
    CorrelationData, NotificationMessage, OrchestratorConfig, PresetResolver, SourceLocation,
};
use url::Url;

/// Encoding job orchestration toolbox
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode or decode job correlation data
    Correlation {
        #[command(subcommand)]
        action: CorrelationAction,
    },
    /// Show the asset and job names a submission would use
    AssetNames {
        /// Input blob URIs or local paths; the first one names the input asset
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        /// Storage account the output asset is attributed to
        #[arg(long)]
        output_account: Option<String>,
    },
    /// Validate a webhook notification body and show what handling it would do
    Classify {
        /// File holding the body, or `-` for stdin
        input: String,
    },
    /// Resolve a preset name to the configuration handed to the encoder; lists configured
    /// presets when no name is given
    Preset { name: Option<String> },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
enum CorrelationAction {
    /// Build correlation data and print its encoded form
    Encode {
        /// Operation context as a JSON document
        #[arg(long)]
        context: Option<String>,

        /// Container finished outputs are copied into
        #[arg(long)]
        output_container: Option<Url>,

        /// Extra `key=value` entries
        #[arg(short, long = "entry", value_parser = parse_entry)]
        entries: Vec<(String, String)>,
    },
    /// Decode an encoded task name and print its entries as JSON
    Decode { encoded: String },
}

fn parse_entry(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let cfg = OrchestratorConfig::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    debug!("Configuration loaded from {:?}", args.config);

    match args.command {
        Command::Correlation { action } => run_correlation(action, &cfg),
        Command::AssetNames { sources, output_account } => run_asset_names(&sources, output_account.as_deref(), &cfg),
        Command::Classify { input } => run_classify(&input),
        Command::Preset { name: Some(name) } => {
            let configuration = cfg
                .preset_resolver()
                .resolve(&name)
                .with_context(|| format!("Failed to resolve preset {name:?}"))?;
            println!("{configuration}");
            Ok(())
        }
        Command::Preset { name: None } => {
            let presets = cfg.preset_resolver();
            for name in presets.names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
    }
}

fn run_correlation(action: CorrelationAction, cfg: &OrchestratorConfig) -> Result<()> {
    match action {
        CorrelationAction::Encode {
            context,
            output_container,
            entries,
        } => {
            let mut correlation: CorrelationData = entries.into_iter().collect();

            if let Some(raw) = context {
                let value: serde_json::Value =
                    serde_json::from_str(&raw).context("Operation context is not a JSON document")?;
                correlation.insert(OPERATION_CONTEXT_KEY, value.to_string());
            }

            if let Some(container) = output_container.or_else(|| cfg.default_output_container.clone()) {
                correlation.insert(OUTPUT_CONTAINER_KEY, container.to_string());
            }

            let encoded = correlation.encode().context("Failed to encode correlation data")?;
            info!("Encoded {} entries into {} characters", correlation.len(), encoded.len());
            println!("{encoded}");
        }
        CorrelationAction::Decode { encoded } => {
            let correlation = CorrelationData::decode(&encoded).context("Failed to decode correlation data")?;
            println!("{}", serde_json::to_string_pretty(&correlation)?);
        }
    }
    Ok(())
}

fn run_asset_names(sources: &[String], output_account: Option<&str>, cfg: &OrchestratorConfig) -> Result<()> {
    let locations = sources
        .iter()
        .map(|raw| SourceLocation::parse(raw).with_context(|| format!("Invalid source {raw:?}")))
        .collect::<Result<Vec<_>>>()?;

    let Some(first) = locations.first() else {
        bail!("At least one source is required");
    };

    let input = naming::input_asset_name_for(first)?;
    let output = naming::output_asset_name(first, output_account)?;

    println!("input asset:  {input}");
    println!("output asset: {output}");
    println!("job name:     {}", naming::job_name(&output));
    match &cfg.default_output_container {
        Some(container) => println!("results to:   {container}"),
        None => println!("results to:   {}", naming::default_output_container(first)?),
    }
    for location in &locations {
        println!("  source: {location}");
    }
    Ok(())
}

fn run_classify(input: &str) -> Result<()> {
    let body = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read notification from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read notification file: {input}"))?
    };

    let message = NotificationMessage::from_json(&body)?;
    let classified = classify(&message)?;

    println!("event:  {}", message.event_type);
    println!("job:    {}", classified.job_id);
    println!("transition: {:?}", classified.transition);
    println!("action: {}", classified.transition.planned_action());
    println!("releases assets: {}", classified.transition.releases_assets());
    Ok(())
}
