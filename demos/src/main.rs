use anyhow::Context as _;
use clap::Parser;
use mock_service::MockConfig;
use rampa::prelude::*;
use rampa::rinha::{default_stages, RinhaWorkload, DEFAULT_BASE_URL};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

/// Staged load test against the banking API.
#[derive(Parser, Debug)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// `<duration>:<target>`, repeatable. Replaces the stages from `--config`.
    #[arg(short, long = "stage")]
    stages: Vec<Stage>,

    /// JSON run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_parser = humantime::parse_duration)]
    pause: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    grace_period: Option<Duration>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    rps: Option<NonZeroU32>,

    /// Run against an in-process mock of the API instead of `--base-url`.
    #[arg(long)]
    serve_mock: bool,
}

impl Cli {
    fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                RunConfig::from_json(&raw)?
            }
            None => RunConfig::new(default_stages()),
        };

        if !self.stages.is_empty() {
            config.stages = self.stages.clone();
        }
        if let Some(pause) = self.pause {
            config.pause = pause;
        }
        if let Some(grace_period) = self.grace_period {
            config.grace_period = grace_period;
        }
        config.seed = self.seed.or(config.seed);
        config.rps = self.rps.or(config.rps);

        // Fail before reaching out to the API.
        config.plan()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("rampa=info,mock_service=warn,rinha=info")
        .init();

    let cli = Cli::parse();
    let config = cli.run_config()?;

    let base_url = if cli.serve_mock {
        let addr = mock_service::spawn(MockConfig::default()).await?;
        format!("http://{addr}")
    } else {
        cli.base_url
    };
    info!("Targeting {base_url}");

    let test = LoadTest::from_config(RinhaWorkload::http(base_url)?, config);
    let stop = test.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping virtual users");
            stop.stop();
        }
    });

    let stats = test.await?;
    println!("{stats}");

    Ok(())
}
