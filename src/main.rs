//! Main application entry point and CLI dispatch.
//!
//! Argument parsing happens first; everything else is delegated to the
//! library: `Nightlightr` for the daemon lifecycle and `print_status` for
//! querying a running instance.

use std::path::PathBuf;

use nightlightr::args::{self, CliAction};
use nightlightr::{Nightlightr, print_status};
use nightlightr::{log_end, log_error, log_pipe};

fn main() {
    let result = match args::parse_args(std::env::args().skip(1)) {
        CliAction::Run {
            debug_enabled,
            config_dir,
        } => Nightlightr::new(debug_enabled)
            .with_config_dir(config_dir.map(PathBuf::from))
            .run(),
        CliAction::Status { config_dir } => {
            print_status(config_dir.map(PathBuf::from).as_deref())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowVersion => {
            args::display_version();
            Ok(())
        }
        CliAction::ShowHelpDueToUnknown { argument } => {
            args::display_help();
            log_pipe!();
            log_error!("Unknown argument: {argument}");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        log_pipe!();
        log_error!("{e:#}");
        log_end!();
        std::process::exit(1);
    }
}
