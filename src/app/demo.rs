//! Stand-in jobs for the console: they produce the same shape of output as
//! the real test suite and benchmark without doing any transforms.

use std::thread;
use std::time::Duration;

use crate::config::BenchmarkConfig;
use crate::engine::job::{JobContext, JobEngine, JobResult};
use crate::models::task::TaskKind;

const TEST_SIZES: [u32; 6] = [16, 32, 64, 128, 256, 512];
const TEST_TARGETS: [&str; 3] = ["SSBO -> SSBO", "Texture -> SSBO", "SSBO -> Image"];
const STEPS_PER_TEST: u64 = 16;
const BENCH_WARMUP: u64 = 5;
const BENCH_ITERATIONS: u64 = 100;

pub fn demo_engine(bench: BenchmarkConfig, step_delay: Duration) -> JobEngine {
    JobEngine::new()
        .with_job(TaskKind::TestSuite, move |ctx| {
            run_test_suite(ctx, step_delay)
        })
        .with_job(TaskKind::Benchmark, move |ctx| {
            run_benchmark(ctx, &bench, step_delay)
        })
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

fn run_test_suite(ctx: &JobContext, step_delay: Duration) -> JobResult {
    let cases: Vec<(u32, &str, bool)> = TEST_SIZES
        .iter()
        .flat_map(|size| {
            TEST_TARGETS
                .iter()
                .flat_map(move |target| [(*size, *target, false), (*size, *target, true)])
        })
        .collect();
    let target = cases.len() as u64 * STEPS_PER_TEST;

    ctx.log(format!("Enqueued {} tests!", cases.len()));
    for (index, (size, path, fp16)) in cases.iter().enumerate() {
        ctx.checkpoint()?;
        ctx.log(format!("Running test #{index}!"));
        ctx.log(format!(
            "Running {path} FFT, {size:04} x {size:04} {} ...",
            if *fp16 { "FP16" } else { "FP32" }
        ));
        for step in 1..=STEPS_PER_TEST {
            ctx.checkpoint()?;
            pause(step_delay);
            ctx.set_progress(index as u64 * STEPS_PER_TEST + step, target);
        }
        ctx.log("... Success!");
    }
    ctx.log("Successfully ran tests!");
    Ok(0)
}

fn run_benchmark(ctx: &JobContext, bench: &BenchmarkConfig, step_delay: Duration) -> JobResult {
    let target = BENCH_WARMUP + BENCH_ITERATIONS;
    ctx.log("Test:");
    ctx.log("  SSBO -> SSBO");
    ctx.log(format!(
        "  Size: {} x {} complex {}",
        bench.width,
        bench.height,
        if bench.fp16 { "FP16" } else { "FP32" }
    ));
    for iteration in 1..=target {
        ctx.checkpoint()?;
        pause(step_delay);
        ctx.set_progress(iteration, target);
    }
    ctx.log(format!("  {:8.3} ms", simulated_millis(bench)));
    Ok(0)
}

/// Synthetic timing proportional to N log N so larger sizes read slower.
fn simulated_millis(bench: &BenchmarkConfig) -> f64 {
    let points = f64::from(bench.width) * f64::from(bench.height);
    let cost = points * points.log2() * 1.0e-6;
    if bench.fp16 {
        cost * 0.6
    } else {
        cost
    }
}
