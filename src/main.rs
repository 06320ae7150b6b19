//! Kodegen Bundler App - configuration-driven app bundler for cargo executables.
//!
//! Parses the command line, initializes logging, runs the selected command and
//! maps its outcome to the process exit code.

use kodegen_bundler_app::{
    bundler::utils::process as child_processes,
    cli::{self, Args},
};
use std::process;

/// Conventional exit status after SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    let args = Args::parse_args();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let config = cli::create_runtime_config(&args);

    let exit_code = tokio::select! {
        result = cli::run(&args, &config) => match result {
            Ok(code) => code,
            Err(e) => {
                report_error(&config, &e);
                1
            }
        },
        _ = tokio::signal::ctrl_c() => {
            let running = child_processes::running_children();
            if running > 0 {
                log::warn!("Interrupted; terminating {} child process(es)", running);
            }
            child_processes::terminate_all();
            INTERRUPTED_EXIT_CODE
        }
    };

    process::exit(exit_code);
}

/// Prints the failure; the whole cause chain under `--verbose`, otherwise the
/// outermost message and the root cause.
fn report_error(config: &cli::RuntimeConfig, error: &kodegen_bundler_app::BundlerError) {
    let chain = error.chain();
    let Some((first, causes)) = chain.split_first() else {
        return;
    };

    let message = match causes.last() {
        Some(root) if !config.is_verbose() => format!("{first}: {root}"),
        _ => first.clone(),
    };
    let _ = config.error(&message);

    if config.is_verbose() {
        for cause in causes {
            eprintln!("  caused by: {cause}");
        }
    }
}
