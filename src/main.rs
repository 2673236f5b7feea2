//! mcpcheck CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use mcpcheck::cli::{Cli, CommandDispatcher, EXIT_ERROR};
use mcpcheck::shell::{is_ci, StopSignal};
use mcpcheck::ui::{create_ui, OutputMode};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("mcpcheck=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcpcheck=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// SIGINT and SIGTERM set the stop flag; the session winds down at the
/// next item or attempt boundary and still writes its report.
fn install_stop_handlers(stop: &StopSignal) {
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, stop.flag()) {
            tracing::warn!("Could not register handler for signal {}: {}", signal, e);
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("mcpcheck starting with args: {:?}", cli);

    let output_mode = OutputMode::from_flags(cli.verbose, cli.quiet);

    if cli.no_color {
        std::env::set_var("NO_COLOR", "1");
    }

    let project_root = cli
        .project
        .as_ref()
        .cloned()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let is_interactive = !is_ci() && console::Term::stdout().is_term();
    let mut ui = create_ui(is_interactive, output_mode);

    let stop = StopSignal::new();
    install_stop_handlers(&stop);

    let dispatcher = CommandDispatcher::new(project_root)
        .with_config_path(cli.config.clone())
        .with_stop(stop);

    match dispatcher.dispatch(&cli, ui.as_mut()) {
        Ok(result) => ExitCode::from(result.exit_code as u8),
        Err(e) => {
            ui.error(&format!("Error: {}", e));
            ExitCode::from(EXIT_ERROR as u8)
        }
    }
}
