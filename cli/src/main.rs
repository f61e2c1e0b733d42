//! Location Simulator CLI
//!
//! Run one simulation of the forwarding-pointer location protocol and print
//! its report.
//!
//! # Example
//!
//! ```bash
//! # Defaults, with a fixed seed
//! location-sim --seed 42
//!
//! # Four couples, fixed forwarder lifetime, one minute of virtual time
//! location-sim -c 4 --ttl 800 -t 60000 --server-mode single-queue
//!
//! # Full configuration from a file, JSON report
//! location-sim --config run.json --json
//! ```

use clap::{Parser, ValueEnum};
use location_simulator_core_rs::{
    ForwarderLifetime, OnSitePolicy, Orchestrator, ServerMode, SimulationConfig, SimulationError,
};
use location_simulator_core_rs::orchestrator::AdaptiveTtl;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error("cannot read config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServerModeArg {
    SingleQueue,
    PerCouple,
}

impl From<ServerModeArg> for ServerMode {
    fn from(mode: ServerModeArg) -> Self {
        match mode {
            ServerModeArg::SingleQueue => ServerMode::SingleQueue,
            ServerModeArg::PerCouple => ServerMode::PerCouple,
        }
    }
}

/// Location Simulator
///
/// Discrete-event simulation of a mobile agent located through forwarder
/// chains with a server fallback. Rates are events per second, durations
/// are milliseconds of virtual time. Runs are reproducible for a given seed.
#[derive(Parser, Debug)]
#[command(name = "location-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Load the full configuration from a JSON file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// λ: source attempt rate
    #[arg(long)]
    lambda: Option<f64>,

    /// ν: rate at which the agent leaves a site
    #[arg(long)]
    nu: Option<f64>,

    /// δ: migration completion rate
    #[arg(long)]
    delta: Option<f64>,

    /// γ1: one-hop communication rate
    #[arg(long)]
    gamma1: Option<f64>,

    /// γ2: server reply rate
    #[arg(long)]
    gamma2: Option<f64>,

    /// μ1: server service rate for location updates
    #[arg(long)]
    mu1: Option<f64>,

    /// μ2: server service rate for source queries
    #[arg(long)]
    mu2: Option<f64>,

    /// α: exponential forwarder lifetime rate
    #[arg(long, conflicts_with_all = ["ttl", "infinite_lifetime"])]
    alpha: Option<f64>,

    /// Fixed forwarder lifetime in milliseconds
    #[arg(long, conflicts_with = "infinite_lifetime")]
    ttl: Option<f64>,

    /// Forwarders never expire
    #[arg(long)]
    infinite_lifetime: bool,

    /// The agent reports to the server every N migrations
    #[arg(short = 'n', long)]
    migrations_before_update: Option<u64>,

    /// Number of (source, agent) couples
    #[arg(short = 'c', long)]
    couples: Option<usize>,

    /// Virtual run length in milliseconds
    #[arg(short = 't', long)]
    run_length: Option<f64>,

    /// Upper bound on the time the agent stays on one site (ms)
    #[arg(long)]
    max_time_on_site: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Server queueing discipline
    #[arg(long, value_enum)]
    server_mode: Option<ServerModeArg>,

    /// The agent never reports its location to the server
    #[arg(long)]
    no_agent_update: bool,

    /// Forwarders are created dead
    #[arg(long)]
    forwarders_born_dead: bool,

    /// Expiring forwarders do not report to the server
    #[arg(long)]
    no_forwarder_update: bool,

    /// Scale forwarder lifetimes with the recent failure rate
    #[arg(long)]
    adaptive_ttl: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<SimulationConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
                    path: path.clone(),
                    source,
                })?;
                serde_json::from_str(&text).map_err(|source| CliError::ParseConfig {
                    path: path.clone(),
                    source,
                })?
            }
            None => SimulationConfig::default(),
        };

        let rates = &mut config.rates;
        let overrides = [
            (&mut rates.arrival, self.lambda),
            (&mut rates.wait, self.nu),
            (&mut rates.migration, self.delta),
            (&mut rates.hop_communication, self.gamma1),
            (&mut rates.server_reply, self.gamma2),
            (&mut rates.agent_service, self.mu1),
            (&mut rates.source_service, self.mu2),
        ];
        for (field, value) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }

        if let Some(alpha) = self.alpha {
            config.forwarder_lifetime = ForwarderLifetime::Exponential { alpha };
        }
        if let Some(ttl) = self.ttl {
            config.forwarder_lifetime = ForwarderLifetime::Fixed { ttl };
        }
        if self.infinite_lifetime {
            config.forwarder_lifetime = ForwarderLifetime::Infinite;
        }
        if let Some(period) = self.migrations_before_update {
            config.max_migrations_before_update = period;
        }
        if let Some(couples) = self.couples {
            config.couples = couples;
        }
        if let Some(run_length) = self.run_length {
            config.run_length = run_length;
        }
        if let Some(max_time_on_site) = self.max_time_on_site {
            config.on_site = OnSitePolicy::Capped { max_time_on_site };
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(mode) = self.server_mode {
            config.server_mode = mode.into();
        }
        if self.no_agent_update {
            config.agent_calls_server = false;
        }
        if self.forwarders_born_dead {
            config.forwarders_born_alive = false;
        }
        if self.no_forwarder_update {
            config.forwarder_calls_server = false;
        }
        if self.adaptive_ttl && config.adaptive_ttl.is_none() {
            config.adaptive_ttl = Some(AdaptiveTtl::default());
        }

        Ok(config)
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let config = args.load_config()?;
    info!(
        couples = config.couples,
        run_length = config.run_length,
        seed = config.seed,
        "Configuration loaded"
    );

    let mut orchestrator = Orchestrator::new(config)?;
    let report = orchestrator.run()?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "warn,location_simulator_core_rs=debug"
    } else {
        "warn,location_simulator_core_rs=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "simulation aborted");
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
