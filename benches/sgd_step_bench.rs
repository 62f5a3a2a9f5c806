use rust_optim::landscape::{opt_fn_with_sgd, pathological_curve_loss};
use rust_optim::nn::Linear;
use rust_optim::{SgdConfig, SGD};
use std::time::Instant;

struct BenchmarkResult {
    name: String,
    numel: usize,
    latency_us: f64,
}

/// Average latency of one optimizer step over a layer's parameters
fn benchmark_step(in_features: usize, out_features: usize, config: SgdConfig, iterations: usize) -> BenchmarkResult {
    let layer = Linear::new(in_features, out_features);
    let params = layer.parameters();
    let numel = params.iter().map(|p| p.numel()).sum();

    // Steps only read the gradient buffers, so fill them once
    for p in &params {
        p.grad.borrow_mut().fill(1e-3);
    }
    let mut sgd = SGD::with_config(params, config);

    // Warm-up
    for _ in 0..3 {
        sgd.step();
    }

    let start = Instant::now();
    for _ in 0..iterations {
        sgd.step();
    }
    let elapsed = start.elapsed();

    BenchmarkResult {
        name: format!("Linear({}, {}) {}", in_features, out_features, config),
        numel,
        latency_us: elapsed.as_secs_f64() * 1e6 / iterations as f64,
    }
}

fn print_results_table(results: &[BenchmarkResult]) {
    println!("{:<55} {:>12} {:>15} {:>15}", "Parameters", "Elements", "Step (us)", "ns / element");
    println!("{}", "-".repeat(100));
    for r in results {
        println!(
            "{:<55} {:>12} {:>15.2} {:>15.3}",
            r.name,
            r.numel,
            r.latency_us,
            r.latency_us * 1000.0 / r.numel as f64
        );
    }
}

fn main() {
    println!("SGD Step Benchmarks");
    println!("===================\n");

    let configs = [
        SgdConfig::new(0.01),
        SgdConfig::new(0.01).with_momentum(0.9),
        SgdConfig::new(0.01).with_momentum(0.9).with_weight_decay(1e-4),
    ];

    // (in, out, iterations)
    let shapes = [(32, 32, 1000), (784, 128, 200), (3072, 512, 20)];

    let mut results = Vec::new();
    for (in_features, out_features, iterations) in shapes {
        for config in configs {
            results.push(benchmark_step(in_features, out_features, config, iterations));
        }
    }
    print_results_table(&results);

    // Full trajectories include the forward and backward pass per step
    println!("\nTrajectory on the pathological curve");
    println!("{}", "=".repeat(50));
    for n_iters in [100, 1000] {
        let config = SgdConfig::new(0.5).with_momentum(0.9);
        let start = Instant::now();
        let xys = opt_fn_with_sgd(pathological_curve_loss, [2.5, 2.5], config, n_iters);
        let elapsed = start.elapsed();
        println!(
            "{:>6} iters: {:>10.3} ms  (final point {:?})",
            n_iters,
            elapsed.as_secs_f64() * 1000.0,
            &xys.data()[2 * (n_iters - 1)..]
        );
    }
}
