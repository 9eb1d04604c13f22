use std::env;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

#[derive(Debug, Deserialize)]
struct CdArgs {
    arg_dir: String,
}

impl builtins::BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: change the shell working directory.

DIR is taken verbatim. On failure the working directory is unchanged.

Usage:
    cd <dir>
";

    fn run(_shell: &mut Shell, args: &[String], _stdout: &mut dyn Write) -> Result<()> {
        let args: CdArgs = parse_args(Self::HELP, Self::NAME, args)?;
        env::set_current_dir(&args.arg_dir).chain_err(|| args.arg_dir.clone())?;
        debug!("changed directory to {}", args.arg_dir);
        Ok(())
    }
}
