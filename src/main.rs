//! qlrun CLI entry point.

use clap::Parser;
use qlrun::cli::{self, Cli, Commands, EXIT_ERROR};
use qlrun::logging;

fn main() {
    let cli = Cli::parse();
    logging::init_tracing(cli.debug);

    let result = match &cli.command {
        Commands::Finalize(args) => cli::run_finalize_command(args, cli.debug),
        Commands::Analyze(args) => cli::run_analyze_command(args, cli.debug),
        Commands::Cleanup(args) => cli::run_cleanup_command(args, cli.debug),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    };

    std::process::exit(exit_code);
}
