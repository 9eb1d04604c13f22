//! Error module. See the [error-chain](https://crates.io/crates/error-chain) crate for details.

use std::io;

use rustyline::error::ReadlineError;

error_chain! {
    foreign_links {
        Docopt(docopt::Error);
        Io(io::Error);
        Nix(nix::Error);
        Readline(ReadlineError);
    }

    errors {
        /// Offending command line that could not be split into pipelines
        Syntax(line: String) {
            description("syntax error")
            display("syntax error near: '{}'", line)
        }
        NoSuchJob(job: String) {
            description("no such job")
            display("{}: no such job", job)
        }
        NoCurrentJob {
            description("no current job")
            display("no current job")
        }
        JobCompleted(job: usize) {
            description("job has already completed")
            display("job {} has already completed", job)
        }
        JobNotStopped(job: usize) {
            description("job is not stopped")
            display("job {} is not stopped", job)
        }
        NoJobControl {
            description("no job control")
            display("no job control")
        }
        /// Creating a pipe or forking a pipeline stage failed
        Launch(input: String) {
            description("failed to launch job")
            display("failed to launch '{}'", input)
        }
    }
}

impl Error {
    pub(crate) fn syntax<T: AsRef<str>>(line: T) -> Error {
        ErrorKind::Syntax(line.as_ref().to_string()).into()
    }

    pub(crate) fn no_such_job<T: AsRef<str>>(job: T) -> Error {
        ErrorKind::NoSuchJob(job.as_ref().to_string()).into()
    }
}

impl Error {
    /// The error and its causes on one line, e.g. `cd: /nope: No such file or directory`.
    pub fn to_chain_string(&self) -> String {
        self.iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(": ")
    }
}
