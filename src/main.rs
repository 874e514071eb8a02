use guidprobe::cli::{CliArgs, Reporter};
use guidprobe::util::{init_logging, LoggingConfig};
use guidprobe::{Probe, ProbeConfig, RealFileSystem, VERSION};

use clap::Parser;
use std::env;
use std::io;
use tracing::{debug, error};

/// Exit code for failures outside the probe pipeline (bad config, no working directory)
const INTERNAL_FAILURE: i32 = 1;

fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_cli_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
    ));

    debug!("guidprobe v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    std::process::exit(run(&args));
}

fn run(args: &CliArgs) -> i32 {
    let config = ProbeConfig::default();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        eprintln!("{}", e);
        return INTERNAL_FAILURE;
    }

    let search_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            error!(error = %e, "Cannot determine working directory");
            eprintln!("Cannot determine working directory: {}", e);
            return INTERNAL_FAILURE;
        }
    };

    let reporter = Reporter::new(&config);
    let probe = Probe::new(RealFileSystem::new(), config);
    let outcome = probe.run(args.assembly_path.as_deref(), &search_root);
    let report = reporter.report(&outcome);

    if let Err(e) = report.write_to(&mut io::stdout().lock(), &mut io::stderr().lock()) {
        error!(error = %e, "Failed to write report");
    }
    report.exit_code
}
