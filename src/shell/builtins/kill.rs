use crate::shell::builtins::{self, prelude::*};

pub struct Kill;

#[derive(Debug, Deserialize)]
struct KillArgs {
    arg_position: String,
}

impl builtins::BuiltinCommand for Kill {
    const NAME: &'static str = builtins::KILL_NAME;

    const HELP: &'static str = "\
kill: send SIGTERM to a job.

Signals every process of the job at POSITION. A stopped job is continued so
that it can act on the signal.

Usage:
    kill <position>
";

    fn run(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write) -> Result<()> {
        let args: KillArgs = parse_args(Self::HELP, Self::NAME, args)?;
        let position = parse_job_position(&args.arg_position)?;
        let job = shell.kill_job(position)?;
        info!("sent SIGTERM to job [{}]: {}", position, job.input());
        Ok(())
    }
}
