use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use sgc_movielens::{
    config::{Cli, Device},
    dataset::{load_data, DataOptions},
    error::Result,
    initialization::Initialization,
    model::Sgc,
    train::Trainer,
};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let t_total = Instant::now();
    let config = cli.train_config();
    let device = Device::select(cli.no_cuda);

    let options = DataOptions {
        min_shared_ratings: cli.min_shared_ratings,
        seed: config.seed,
    };
    let data = load_data(&cli.dataset, &cli.data_dir, &options, device)?;

    let mut rng = fastrand::Rng::with_seed(config.seed);
    let model = Sgc::new(
        data.num_features(),
        data.num_classes(),
        config.degree,
        Initialization::FanInUniform,
        &mut rng,
    );
    debug!(dropout = config.dropout, "dropout is not used by {model}");

    let mut trainer = Trainer::new(model, &data, config);
    trainer.fit(|report| println!("{report}"))?;
    println!("Optimization Finished!");
    println!(
        "Total time elapsed: {:.4}s",
        t_total.elapsed().as_secs_f32()
    );

    println!("{}", trainer.test()?);
    Ok(())
}
