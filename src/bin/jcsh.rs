#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use docopt::Docopt;
use jcsh::errors::*;
use jcsh::{Shell, ShellConfig};
use log::LevelFilter;
use nix::unistd::Pid;

const COMMAND_HISTORY_CAPACITY: usize = 100;
const LOG_FILE_NAME: &str = ".jcsh_log";

const USAGE: &str = "
jcsh - job-control shell.

Usage:
    jcsh [options]
    jcsh [options] -c <command>
    jcsh [options] <file>
    jcsh (-h | --help)
    jcsh --version

Options:
    -h --help               Show this screen.
    --version               Show version.
    -c                      If the -c option is present, then commands are read from the first
                                non-option argument command_string.
    --log=<path>            File to write log to, defaults to ~/.jcsh_log
    --log-level=<level>     Minimum level to log, e.g. debug [default: info]
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
    flag_log_level: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    if let Err(e) = init_logger(&args) {
        eprintln!("jcsh: failed to initialize logging: {}", e.to_chain_string());
    }
    debug!("{:?}", args);

    if args.flag_version {
        println!("jcsh version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

fn init_logger(args: &Args) -> Result<()> {
    let level = LevelFilter::from_str(&args.flag_log_level)
        .map_err(|_| Error::from(format!("invalid log level '{}'", args.flag_log_level)))?;
    let log_path = match args.flag_log {
        Some(ref path) => PathBuf::from(path),
        None => default_log_path()?,
    };

    let pid = Pid::this();
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(fern::log_file(&log_path).chain_err(|| log_path.display().to_string())?)
        .apply()
        .map_err(|_| Error::from("logger already set"))?;
    Ok(())
}

fn default_log_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(LOG_FILE_NAME))
        .ok_or_else(|| "unable to get home directory".into())
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell.execute_commands_from_file(file_path)
    } else {
        unreachable!();
    };

    if let Err(e) = result {
        error!("{}", e);
        eprintln!("jcsh: {}", e.to_chain_string());
        shell.exit(1);
    }
    shell.exit(0);
}

fn execute_from_stdin() -> ! {
    let shell_config = ShellConfig::interactive(COMMAND_HISTORY_CAPACITY);
    let mut shell = Shell::new(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    shell.execute_from_stdin();
    shell.exit(0)
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("jcsh: {}", error.to_chain_string());
    process::exit(1);
}
