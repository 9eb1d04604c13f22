//! Jcsh - Shell Module
//!
//! The Shell owns the job table and the line editor. Each parsed pipeline is
//! either run as a builtin inside the shell or handed to the launcher.

use std::fmt;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::Path;
use std::process;

use nix::unistd::Pid;

use crate::editor::Editor;
use crate::errors::{Error, Result, ResultExt};
use crate::job::Job;
use crate::parser;
use crate::shell::{
    builtins,
    execute_command::create_output_file,
    job_control::{self, JobManager},
    terminal::Terminal,
    ShellConfig,
};

/// Jcsh Shell
pub struct Shell {
    /// Responsible for readline and history.
    editor: Editor,
    job_manager: JobManager,
    config: ShellConfig,
}

impl Shell {
    /// Constructs a new Shell to manage running jobs and command history.
    ///
    /// Job control is only enabled if the config asks for it, standard input
    /// is a terminal and the shell manages to become its foreground process
    /// group.
    pub fn new(config: ShellConfig) -> Result<Shell> {
        let mut job_control = config.enable_job_control && io::stdin().is_terminal();
        let mut terminal = if job_control {
            Terminal::from_stdin()?
        } else {
            Terminal::detached()
        };

        if job_control {
            if let Err(e) = job_control::initialize_job_control(&mut terminal) {
                error!(
                    "failed to initialize shell for job control despite isatty: {}",
                    e
                );
                terminal = Terminal::detached();
                job_control = false;
            }
        }

        let shell = Shell {
            editor: Editor::with_capacity(config.command_history_capacity)?,
            job_manager: JobManager::new(terminal, job_control, config.display_messages),
            config,
        };

        info!("jcsh started up (job control: {})", job_control);
        Ok(shell)
    }

    pub fn is_interactive(&self) -> bool {
        self.job_manager.is_job_control_enabled()
    }

    /// Runs every `;`-separated pipeline of a command string, in order.
    ///
    /// A failing pipeline is reported and the next one still runs.
    pub fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        // skip if empty
        if input.is_empty() {
            return Ok(());
        }

        if self.config.enable_command_history {
            self.editor.add_history_entry(input);
        }

        let jobs = match parser::parse(input) {
            Ok(jobs) => jobs,
            Err(e) => {
                report_error(&e);
                return Ok(());
            }
        };

        for job in jobs {
            if let Err(e) = self.execute_job(job) {
                report_error(&e);
            }
        }

        Ok(())
    }

    /// Runs a jcsh script from a file, line by line.
    pub fn execute_commands_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).chain_err(|| path.display().to_string())?;
        for line in contents.lines() {
            self.execute_command_string(line)?;
        }

        Ok(())
    }

    /// Runs jobs from stdin until EOF is received.
    pub fn execute_from_stdin(&mut self) {
        let prompt = format!("jcsh-{}$ ", Pid::this());
        loop {
            // Check the status of background jobs, removing exited ones.
            self.job_manager.do_job_notification();

            let input = match self.editor.readline(&prompt) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    error!("prompt: {}", e);
                    report_error(&e);
                    break;
                }
            };

            let temp_result = self.execute_command_string(&input);
            log_if_err!(temp_result, "execute_command_string");
        }
    }

    /// Runs a builtin in the shell, or launches the job's processes.
    fn execute_job(&mut self, job: Job) -> Result<()> {
        let process = &job.processes()[0];
        let program = process.program();
        if !builtins::is_builtin(program) {
            return self.job_manager.launch(job);
        }

        if job.processes().len() > 1 || job.is_background() {
            warn!("builtin runs in the shell, ignoring rest of: {}", job.input());
        }

        let args = &process.argv()[1..];
        let result = match process.stdout() {
            Some(path) => {
                let mut file = create_output_file(path)?;
                builtins::run(self, program, args, &mut file)
            }
            None => {
                let mut stdout = io::stdout();
                let result = builtins::run(self, program, args, &mut stdout);
                let temp_result = stdout.flush();
                log_if_err!(temp_result, "failed to flush stdout");
                result
            }
        };

        result.chain_err(|| program.to_string())
    }

    /// Returns `true` if the shell has unfinished or unreported jobs.
    pub fn has_jobs(&self) -> bool {
        self.job_manager.has_jobs()
    }

    /// Returns the shell's jobs; the job at index `i` has position `i + 1`.
    pub fn jobs(&self) -> &[Job] {
        self.job_manager.jobs()
    }

    /// Records status changes of any child without blocking.
    pub fn update_job_statuses(&mut self) {
        let temp_result = self.job_manager.update_job_statuses();
        log_if_err!(temp_result, "update_job_statuses");
    }

    /// Resumes the job at `position`, or the most recent one, in the foreground.
    pub fn put_job_in_foreground(&mut self, position: Option<usize>) -> Result<()> {
        self.update_job_statuses();
        self.job_manager.put_job_in_foreground(position)
    }

    /// Resumes the job at `position` in the background.
    pub fn put_job_in_background(&mut self, position: usize) -> Result<()> {
        self.update_job_statuses();
        self.job_manager.put_job_in_background(position)
    }

    /// Sends `SIGTERM` to the job at `position`.
    pub fn kill_job(&mut self, position: usize) -> Result<&Job> {
        self.update_job_statuses();
        self.job_manager.kill_job(position)
    }

    /// Exit the shell with a status of `code`. Outstanding jobs are not
    /// cleaned up.
    pub fn exit(&mut self, code: i32) -> ! {
        if self.config.display_messages {
            println!("exit");
        }

        info!("jcsh has shut down");
        process::exit(code);
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}\n{:?}", self.job_manager, self.editor)
    }
}

fn report_error(error: &Error) {
    debug!("{:?}", error);
    eprintln!("jcsh: {}", error.to_chain_string());
}
