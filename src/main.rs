use std::{env, io, path::PathBuf, process::ExitCode, time::Duration};

use fft_task_bridge::app::{cli, demo};
use fft_task_bridge::{BridgeConfig, Result, TaskController, TaskKind, TaskOutcome};
use log::error;

const DEMO_STEP_DELAY: Duration = Duration::from_millis(15);
const ENV_CONFIG_PATH: &str = "FFT_BRIDGE_CONFIG";

fn usage() {
    eprintln!("Usage: fft-bridge [--config path] [test | bench]");
    eprintln!("       Without a task kind an interactive console is started.");
}

fn run() -> Result<Option<TaskOutcome>> {
    let mut args = env::args().skip(1);
    let mut config_path = env::var_os(ENV_CONFIG_PATH).map(PathBuf::from);
    let mut headless = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config_path = args.next().map(PathBuf::from),
            "help" | "--help" | "-h" => {
                usage();
                return Ok(None);
            }
            other => match other.parse::<TaskKind>() {
                Ok(kind) => headless = Some(kind),
                Err(message) => {
                    eprintln!("{message}");
                    usage();
                    return Ok(Some(TaskOutcome::Failed(2)));
                }
            },
        }
    }

    let config = BridgeConfig::load(config_path.as_deref())?;
    let engine = demo::demo_engine(config.benchmark.clone(), DEMO_STEP_DELAY);
    let mut controller = TaskController::new(engine, config);

    match headless {
        Some(kind) => cli::run_headless(&mut controller, kind, io::stdout()).map(Some),
        None => cli::run_cli(controller).map(|()| None),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    match run() {
        Ok(None) | Ok(Some(TaskOutcome::Completed(0))) => ExitCode::SUCCESS,
        Ok(Some(TaskOutcome::Completed(code) | TaskOutcome::Failed(code))) => {
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Ok(Some(TaskOutcome::Cancelled)) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            eprintln!("[ERROR]: {e}");
            ExitCode::FAILURE
        }
    }
}
