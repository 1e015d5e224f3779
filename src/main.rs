use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use compaction_harness::{
    backend::{self, config, ConfigError, HarnessConfig},
    cli::{Cli, Commands},
    commands::{self, interactive, menu},
    harness::{ConversationConfig, ConversationHarness, SessionIdentity},
    scenarios,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_path = match compaction_harness::init_tracing(cli.verbose) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Warning: logging disabled, could not open log file: {e}");
            None
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!(error = %message, "fatal error");
            eprintln!("Error: {message}");
            if let Some(path) = log_path {
                eprintln!("Log: {}", path.display());
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config =
        config::resolve_config(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }

    if let Err(e) = config.validate() {
        if let ConfigError::MissingValue { key, hint } = &e {
            let rule = "=".repeat(80);
            eprintln!("{rule}\nERROR: {key} is not set\n{rule}\n{hint}\n");
        }
        return Err(e.into());
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let all_scenarios = scenarios::all_scenarios(cli.scenarios.as_deref())?;

    let backend = backend::connect(&config)?;
    let harness = ConversationHarness::new(
        Arc::clone(&backend),
        SessionIdentity::new(&config.app_name, &config.user_id),
    );
    tracing::info!(
        backend = backend.name(),
        app_name = %config.app_name,
        user_id = %config.user_id,
        scenarios = all_scenarios.len(),
        "harness ready"
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let mut out = std::io::stdout();
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let defaults = ConversationConfig::from(&config.defaults.to_settings());

    match cli.selected_command() {
        Commands::List => commands::list_scenarios(&mut out, &all_scenarios),
        Commands::Run { ids } => {
            let selected = commands::select_scenarios(&all_scenarios, &ids)
                .map_err(|n| anyhow!("unknown scenario number {n} (see `compaction-harness list`)"))?;
            commands::run_scenarios(&harness, &selected, &cancel, &mut out).await?;
        }
        Commands::RunAll => {
            let selected = commands::numbered(&all_scenarios);
            commands::run_scenarios(&harness, &selected, &cancel, &mut out).await?;
        }
        Commands::Chat { interval, overlap } => {
            let chat_config = ConversationConfig {
                compaction_interval: interval.unwrap_or(defaults.compaction_interval),
                overlap_size: overlap.unwrap_or(defaults.overlap_size),
                summarizer: defaults.summarizer.clone(),
            };
            interactive::run_interactive(&harness, &chat_config, &mut input, &cancel, &mut out)
                .await?;
        }
        Commands::Menu => {
            println!("Context compaction harness ({} backend)", backend.name());
            menu::run_menu(&harness, &all_scenarios, &defaults, &mut input, &cancel, &mut out).await;
        }
    }

    Ok(())
}
