use clap::Parser;
use seye::cli::{self, Cli};
use seye::logging::{self, LogConfig};

fn main() {
    if let Err(e) = logging::init_logging(&LogConfig::default()) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    if let Err(e) = cli::run(cli) {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}
