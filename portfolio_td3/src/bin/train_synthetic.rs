//! Train a TD3 portfolio agent on the synthetic market.
//!
//! ```bash
//! cargo run --release --bin train_synthetic -- --assets 4 --window 16 --iters 500
//! cargo run --release --bin train_synthetic -- --config agent.toml --resume
//! ```

use std::error::Error;
use std::path::PathBuf;

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use clap::Parser;
use tracing::{info, warn};

use portfolio_td3::prelude::*;
use portfolio_td3::runners::BackendMemoryCleanup;
use portfolio_td3::{CheckpointError, CsvTelemetry, TracingTelemetry};

#[cfg(not(feature = "wgpu"))]
type Inner = burn::backend::NdArray<f32>;
#[cfg(feature = "wgpu")]
type Inner = burn::backend::wgpu::Wgpu;

type B = Autodiff<Inner>;

#[derive(Debug, Parser)]
#[command(name = "train_synthetic", about = "TD3 portfolio agent on a synthetic market", version)]
struct Args {
    /// TOML file with `[td3]` and `[trainer]` tables. Defaults apply otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of assets (features and action dimension).
    #[arg(long, default_value_t = 3)]
    assets: usize,

    /// Observation window length.
    #[arg(long, default_value_t = 8)]
    window: usize,

    /// Override `trainer.max_iter_num`.
    #[arg(long)]
    iters: Option<usize>,

    /// Hidden layer width of both networks.
    #[arg(long, default_value_t = 64)]
    hidden: usize,

    /// Continue from the weights and best portfolio in `model_dir`.
    #[arg(long)]
    resume: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args.log);

    let mut config = match &args.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    if let Some(iters) = args.iters {
        config.trainer.max_iter_num = iters;
    }
    config.validate()?;

    let device = <B as Backend>::Device::default();
    let market = SyntheticMarketConfig::new(args.assets, args.window);

    let policy_config = MlpPolicyConfig::new(args.assets, args.assets)
        .with_hidden_layers(vec![args.hidden, args.hidden])
        .with_action_low(config.td3.action_low)
        .with_action_high(config.td3.action_high);
    let value_config = TwinMlpCriticConfig::new(args.assets, args.assets)
        .with_hidden_layers(vec![args.hidden, args.hidden]);

    let checkpointer = Checkpointer::new(CheckpointerConfig::new(&config.trainer.model_dir))?;

    let mut policy = policy_config.init::<B>(&device);
    let mut value = value_config.init::<B>(&device);
    let mut best = BestPortfolio::default();

    if args.resume {
        policy = checkpointer.load_policy(policy, &device)?;
        value = checkpointer.load_value(value, &device)?;
        match checkpointer.load_best_portfolio() {
            Ok(record) => {
                if let Some(previous) = record.best_portfolio {
                    best = BestPortfolio::new(previous);
                }
                info!(best = best.value(), iteration = record.iteration, "resumed");
            }
            Err(CheckpointError::NotFound(path)) => {
                warn!(path = %path.display(), "no best portfolio record, starting from scratch");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let (policy_optimizer, value_optimizer) =
        adam_optimizers::<B, MlpPolicy<B>, TwinMlpCritic<B>>();
    let learner = Td3Learner::new(
        policy,
        value,
        policy_optimizer,
        value_optimizer,
        config.td3.clone(),
        device.clone(),
    )?;

    let worker_policy = policy_config.clone();
    let exploration = ExplorationStrategy::<B, _, _, _>::from_config(
        &config.td3,
        &config.trainer,
        // every environment gets its own price path
        |id| {
            market
                .clone()
                .with_seed(config.trainer.seed.wrapping_add(id as u64))
                .build()
        },
        move |device: &<Inner as Backend>::Device| worker_policy.init::<Inner>(device),
    )?;
    info!(
        num_env = config.trainer.num_env,
        multi = exploration.is_multi(),
        assets = args.assets,
        window = args.window,
        "exploration ready"
    );

    let mut telemetry = MultiTelemetry::new().add(TracingTelemetry);
    if let Some(path) = &config.trainer.telemetry_path {
        telemetry = telemetry.add(CsvTelemetry::new(path)?);
    }

    let mut trainer = Td3Trainer::new(
        learner,
        exploration,
        checkpointer,
        telemetry,
        config.trainer.clone(),
    )
    .with_reclaimer(BackendMemoryCleanup::<B>::new(device));

    let summary = trainer.learn(&mut best)?;

    println!(
        "iterations={} steps={} best_portfolio={:.4} final_portfolio={:.4} checkpoints={} elapsed={:.1}s",
        summary.iterations,
        summary.global_steps,
        summary.best_portfolio,
        summary.final_portfolio,
        summary.checkpoints_written,
        summary.elapsed.as_secs_f32(),
    );

    Ok(())
}
