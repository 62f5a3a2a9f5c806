use std::env;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rust_optim::landscape::{opt_fn_with_sgd, LossSurface};
use rust_optim::plot::{PlotData, Trace};
use rust_optim::{ExperimentConfig, Tensor};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = match env::args().nth(1) {
        Some(path) => ExperimentConfig::load(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => ExperimentConfig::default(),
    };
    info!(?config, "starting sweep");

    println!("=== Momentum SGD on the {} loss ===\n", config.loss);

    let loss_fn = config.loss.loss_fn();
    let surface = LossSurface::sample(
        loss_fn,
        config.surface.x_range,
        config.surface.y_range,
        config.surface.n_points,
    );
    let mut plot = PlotData::new(format!("{} loss", config.loss), surface);

    let mut diverged = 0usize;
    for run in &config.runs {
        let xys = opt_fn_with_sgd(loss_fn, config.start, *run, config.n_iters);
        let trace = Trace::from_trajectory(run.to_string(), &xys);

        match (trace.diverged_at, trace.end()) {
            (Some(row), _) => {
                diverged += 1;
                println!("{run}: DIVERGED at step {row}, trace kept up to the last finite point");
            }
            (None, Some([x, y])) => {
                let loss = loss_fn(&Tensor::scalar(x), &Tensor::scalar(y)).item();
                println!("{run}: last point ({x:.4}, {y:.4}), loss {loss:.4}");
            }
            (None, None) => {}
        }
        plot.push_trace(trace);
    }

    plot.write_json(&config.output)
        .with_context(|| format!("failed to write {}", config.output.display()))?;

    println!(
        "\nWrote {} trajectories of {} steps to {}",
        plot.traces.len(),
        config.n_iters,
        config.output.display()
    );
    if diverged > 0 {
        warn!(diverged, runs = config.runs.len(), "some runs diverged");
        println!("{diverged} of {} runs diverged", config.runs.len());
    }
    Ok(())
}
