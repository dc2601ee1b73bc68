//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `clinicrm_core` and
//!   `clinicrm_api` wiring.
//! - Keep output deterministic for quick local sanity checks.

use clap::{Parser, Subcommand};
use clinicrm_api::CrmApi;
use clinicrm_core::sample::sample_as_of;
use clinicrm_core::{
    calculate_detailed, init_from_config, AnalyticsService, CoreConfig, SampleGenerator,
    SystemClock,
};
use log::info;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinicrm")]
#[command(about = "Referral, commission and follow-up task engine")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CLINICRM_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a health-check response
    Ping,
    /// Print the core crate version
    Version,
    /// Split commission for one deal amount
    Commission {
        #[arg(long)]
        amount: Decimal,
        /// Defaults to `commission.rate`
        #[arg(long)]
        rate: Option<Decimal>,
        /// Referrer share of the total; defaults to `commission.split_ratio`
        #[arg(long)]
        split: Option<Decimal>,
    },
    /// Generate seeded sample data and print team statistics
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 50)]
        referrals: usize,
    },
    /// Run one JSON operation against a fresh in-memory store
    Call {
        operation: String,
        #[arg(default_value = "{}")]
        payload: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String, String> {
    let config = load_config(cli.config.as_ref())?;
    init_from_config(&config.logging).map_err(|err| err.to_string())?;

    match cli.command {
        Command::Ping => Ok(format!("clinicrm_core ping={}", clinicrm_api::ping())),
        Command::Version => Ok(format!(
            "clinicrm_core version={}",
            clinicrm_api::core_version()
        )),
        Command::Commission {
            amount,
            rate,
            split,
        } => {
            let breakdown = calculate_detailed(
                amount,
                rate.unwrap_or(config.commission.rate),
                split.unwrap_or(config.commission.split_ratio),
                config.commission.currency_scale,
            )
            .map_err(|err| err.to_string())?;
            serde_json::to_string_pretty(&breakdown).map_err(|err| err.to_string())
        }
        Command::Demo { seed, referrals } => {
            let world = SampleGenerator::new(seed)
                .generate(&config, referrals)
                .map_err(|err| err.to_string())?;
            let analytics =
                AnalyticsService::new(world.referrals.clone(), world.tasks.clone(), &config);
            let stats = analytics
                .team_stats(
                    world.window_start,
                    world.window_end,
                    None,
                    sample_as_of(&world, &config),
                )
                .map_err(|err| err.to_string())?;
            info!(
                "event=cli_demo module=cli status=ok seed={} referrals={}",
                seed, referrals
            );
            serde_json::to_string_pretty(&stats).map_err(|err| err.to_string())
        }
        Command::Call { operation, payload } => {
            let api = CrmApi::in_memory(config, Arc::new(SystemClock));
            Ok(api.dispatch_json(&operation, &payload))
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<CoreConfig, String> {
    match path {
        Some(path) => CoreConfig::load(path).map_err(|err| err.to_string()),
        None => {
            let mut config = CoreConfig::default();
            config
                .apply_env_overrides()
                .and_then(|()| config.validate())
                .map_err(|err| err.to_string())?;
            Ok(config)
        }
    }
}
