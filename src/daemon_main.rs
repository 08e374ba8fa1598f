// This runs daemon on windows without creating a console. Disable during development to see
// stdout.
#![windows_subsystem = "windows"]

use std::env::args;

use activity_tracker::{
    config::Config,
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::resolve_application_dir,
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};
use anyhow::Result;
use clap::Parser;
use tracing::error;

fn main() -> Result<()> {
    run_service(args().collect::<Vec<_>>())
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = DaemonArgs::parse_from(&command_args);

    if !args.force {
        #[cfg(feature = "win")]
        {
            let mut command_args = command_args;
            use std::os::windows::process::CommandExt;
            use windows::Win32::System::Threading::DETACHED_PROCESS;

            command_args.push("--force".into());
            let process_name = std::env::current_exe()?;
            let mut command = std::process::Command::new(process_name);
            command.args(command_args.into_iter().skip(1));
            command.creation_flags(DETACHED_PROCESS.0);
            command.stdin(std::process::Stdio::null());
            command.stdout(std::process::Stdio::null());
            command.stderr(std::process::Stdio::null());
            #[allow(clippy::zombie_processes)]
            command.spawn()?;
            println!("Started tracker");
            return Ok(());
        }
        #[cfg(unix)]
        {
            use daemonize::Daemonize;

            // The application directory is resolved before detaching, relative paths included.
            let mut args = args;
            args.dir = Some(resolve_application_dir(args.dir.as_deref())?.canonicalize()?);

            let daemonize = Daemonize::new()
                .working_directory("/")
                .stdout(daemonize::Stdio::devnull())
                .stderr(daemonize::Stdio::devnull())
                .execute();
            return match daemonize {
                daemonize::Outcome::Parent(parent) => {
                    parent?;
                    println!("Started tracker");
                    Ok(())
                }
                daemonize::Outcome::Child(child) => {
                    child?;
                    run(args)
                }
            };
        }
    }

    run(args)
}

fn run(args: DaemonArgs) -> Result<()> {
    let app_dir = resolve_application_dir(args.dir.as_deref())?;
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    let mut config = Config::load(&app_dir).inspect_err(|e| error!("Invalid config {e:?}"))?;
    args.overrides.apply(&mut config);
    single_thread_runtime()?.block_on(start_daemon(app_dir, config))
}
