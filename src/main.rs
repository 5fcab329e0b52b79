use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use genesis_ci::cli::{self, output, Cli};

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let code = match cli::execute(&cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(&e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// RUST_LOG takes precedence; otherwise `-v` raises the level from INFO.
fn setup_logging(verbosity: u8) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => {
            let level = match verbosity {
                0 => LevelFilter::INFO,
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            };
            EnvFilter::default().add_directive(level.into())
        }
    };

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 0)
        .with_thread_names(false)
        .with_span_events(if verbosity > 1 {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .init();

    tracing::debug!("Debug mode: verbosity {}", verbosity);
}
