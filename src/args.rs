//! Command-line argument parsing and processing.
//!
//! This module handles parsing of command-line arguments and provides a
//! clean interface for the main application logic. It supports the standard
//! help, version, and debug flags while gracefully handling unknown options.

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the controller daemon with these settings
    Run {
        debug_enabled: bool,
        config_dir: Option<String>,
    },
    /// Query a running instance for its status
    Status { config_dir: Option<String> },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to an unknown or malformed argument and exit
    ShowHelpDueToUnknown { argument: String },
}

/// Parse process arguments (without the program name) into a `CliAction`.
pub fn parse_args<I>(args: I) -> CliAction
where
    I: IntoIterator<Item = String>,
{
    let mut debug_enabled = false;
    let mut config_dir: Option<String> = None;
    let mut status_requested = false;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return CliAction::ShowHelp,
            "-V" | "--version" => return CliAction::ShowVersion,
            "-d" | "--debug" => debug_enabled = true,
            "-c" | "--config" => match iter.next() {
                Some(dir) => config_dir = Some(dir),
                None => {
                    return CliAction::ShowHelpDueToUnknown {
                        argument: format!("{arg} (missing directory)"),
                    };
                }
            },
            "status" if !status_requested => status_requested = true,
            other => {
                return CliAction::ShowHelpDueToUnknown {
                    argument: other.to_string(),
                };
            }
        }
    }

    if status_requested {
        CliAction::Status { config_dir }
    } else {
        CliAction::Run {
            debug_enabled,
            config_dir,
        }
    }
}

/// Display help information.
pub fn display_help() {
    log_version!();
    log_block_start!("Usage: nightlightr [OPTIONS] [COMMAND]");
    log_indented!("(no command)      Run the controller daemon");
    log_indented!("status            Query a running instance for its status");
    log_pipe!();
    log_decorated!("Options:");
    log_indented!("-c, --config <DIR>  Use a custom configuration directory");
    log_indented!("-d, --debug         Enable debug logging");
    log_indented!("-h, --help          Show this help");
    log_indented!("-V, --version       Show version information");
    log_end!();
}

/// Display version information.
pub fn display_version() {
    log_version!();
    log_decorated!("Schedule-driven day/night lighting controller");
    log_end!();
}
