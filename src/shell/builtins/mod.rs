//! Jcsh builtins
//!
//! Commands the shell runs itself instead of forking, because they act on the
//! shell's own state: its working directory and its job table. Arguments are
//! parsed with docopt from each command's help text.

use std::iter;

use docopt::Docopt;
use serde::de::DeserializeOwned;

use self::prelude::*;

use self::dirs::Cd;
use self::jobs::{Bg, Fg, Jobs};
use self::kill::Kill;
use self::quit::Quit;

pub mod prelude {
    pub use std::io::Write;

    pub use super::{parse_args, parse_job_position, BuiltinCommand};
    pub use crate::errors::{Error, ErrorKind, Result, ResultExt};
    pub use crate::shell::Shell;
}

mod dirs;
mod jobs;
mod kill;
mod quit;

const BG_NAME: &str = "bg";
const CD_NAME: &str = "cd";
const FG_NAME: &str = "fg";
const JOBS_NAME: &str = "jobs";
const KILL_NAME: &str = "kill";
const QUIT_NAME: &str = "quit";

/// Represents a Jcsh builtin command such as cd or fg.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user, with a docopt `Usage:` section.
    const HELP: &'static str;
    /// Runs the command with the given arguments in the `shell` environment.
    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [BG_NAME, CD_NAME, FG_NAME, JOBS_NAME, KILL_NAME, QUIT_NAME].contains(&program.as_ref())
}

/// precondition: command is a builtin.
pub fn run(shell: &mut Shell, program: &str, args: &[String], stdout: &mut dyn Write) -> Result<()> {
    debug_assert!(is_builtin(program));
    debug!("running builtin: {} {:?}", program, args);

    match program {
        BG_NAME => Bg::run(shell, args, stdout),
        CD_NAME => Cd::run(shell, args, stdout),
        FG_NAME => Fg::run(shell, args, stdout),
        JOBS_NAME => Jobs::run(shell, args, stdout),
        KILL_NAME => Kill::run(shell, args, stdout),
        QUIT_NAME => Quit::run(shell, args, stdout),
        _ => unreachable!(),
    }
}

pub fn parse_args<D, I, S>(usage: &str, program: &str, args: I) -> Result<D>
where
    D: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let argv = iter::once(program.to_string())
        .chain(args.into_iter().map(|arg| arg.as_ref().to_string()));
    let args = Docopt::new(usage).and_then(|d| d.argv(argv).deserialize())?;
    Ok(args)
}

/// Parses a job position such as `2` or `%2`.
pub fn parse_job_position(arg: &str) -> Result<usize> {
    let digits = arg.strip_prefix('%').unwrap_or(arg);
    digits.parse::<usize>().map_err(|_| Error::no_such_job(arg))
}
