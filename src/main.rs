use std::process::ExitCode;

use activity_tracker::{cli::run_cli, utils::runtime::single_thread_runtime};
use tracing::error;

fn main() -> ExitCode {
    let result = single_thread_runtime().and_then(|runtime| runtime.block_on(run_cli()));
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Error running cli {e:?}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
