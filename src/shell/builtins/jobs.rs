use crate::shell::builtins::{self, prelude::*};
use crate::shell::job_control::format_job;

pub struct Jobs;

#[derive(Debug, Deserialize)]
struct JobsArgs {
    flag_l: bool,
    flag_p: bool,
}

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
jobs: display status of jobs.

Lists the active jobs with their position, state and command line.

Usage:
    jobs [-l | -p]

Options:
    -l  Lists process IDs, states and commands in addition to the normal information.
    -p  Lists process IDs only.
";

    fn run(shell: &mut Shell, args: &[String], stdout: &mut dyn Write) -> Result<()> {
        let args: JobsArgs = parse_args(Self::HELP, Self::NAME, args)?;
        debug!("{:?}", args);

        shell.update_job_statuses();
        for (index, job) in shell.jobs().iter().enumerate() {
            if args.flag_p {
                for pid in job.processes().iter().filter_map(|p| p.id()) {
                    writeln!(stdout, "{}", pid)?;
                }
                continue;
            }

            writeln!(stdout, "{}", format_job(index + 1, job))?;
            if args.flag_l {
                for process in job.processes() {
                    let pid = process.id().map_or_else(|| "-".to_string(), |pid| pid.to_string());
                    writeln!(stdout, "\t{}\t{}\t{}", pid, process.status(), process)?;
                }
            }
        }

        Ok(())
    }
}

pub struct Fg;

#[derive(Debug, Deserialize)]
struct FgArgs {
    arg_position: Option<String>,
}

impl builtins::BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "\
fg: move job to the foreground.

Resumes the stopped job at POSITION with the terminal and waits for it. Without
POSITION, the most recently started job is used.

Usage:
    fg [<position>]
";

    fn run(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write) -> Result<()> {
        let args: FgArgs = parse_args(Self::HELP, Self::NAME, args)?;
        let position = match args.arg_position {
            Some(ref arg) => Some(parse_job_position(arg)?),
            None => None,
        };
        shell.put_job_in_foreground(position)
    }
}

pub struct Bg;

#[derive(Debug, Deserialize)]
struct BgArgs {
    arg_position: String,
}

impl builtins::BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "\
bg: move job to the background.

Resumes the job at POSITION without giving it the terminal, as if it had been
started with `&'.

Usage:
    bg <position>
";

    fn run(shell: &mut Shell, args: &[String], _stdout: &mut dyn Write) -> Result<()> {
        let args: BgArgs = parse_args(Self::HELP, Self::NAME, args)?;
        let position = parse_job_position(&args.arg_position)?;
        shell.put_job_in_background(position)
    }
}
