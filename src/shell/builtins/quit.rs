use crate::shell::builtins::{self, prelude::*};

pub struct Quit;

impl builtins::BuiltinCommand for Quit {
    const NAME: &'static str = builtins::QUIT_NAME;

    const HELP: &'static str = "\
quit: exit the shell with a status of 0.

Arguments are ignored. Outstanding jobs are left running.

Usage:
    quit [<args>...]
";

    fn run(shell: &mut Shell, _args: &[String], _stdout: &mut dyn Write) -> Result<()> {
        shell.exit(0);
    }
}
