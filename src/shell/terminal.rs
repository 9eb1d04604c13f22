//! Ownership of the controlling terminal.

use std::fmt;
use std::io::{self, IsTerminal};
use std::os::unix::io::{AsFd, AsRawFd, OwnedFd, RawFd};

use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::{self, Pid};

use crate::errors::Result;

/// The shell's controlling terminal.
///
/// Holds a close-on-exec duplicate of the shell's standard input, so a forked
/// child can still hand the terminal to its process group after its own
/// standard input has been rewired to a pipe. A detached terminal (standard
/// input is not a tty, or job control is off) turns every operation into a
/// no-op.
pub struct Terminal {
    fd: Option<OwnedFd>,
    shell_pgid: Pid,
    shell_tmodes: Option<Termios>,
}

impl Terminal {
    /// Attaches to standard input if it is an interactive terminal.
    pub fn from_stdin() -> Result<Self> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(Self::detached());
        }

        let fd = stdin.as_fd().try_clone_to_owned()?;
        let shell_tmodes = termios::tcgetattr(&fd).ok();
        Ok(Self {
            fd: Some(fd),
            shell_pgid: unistd::getpgrp(),
            shell_tmodes,
        })
    }

    pub fn detached() -> Self {
        Self {
            fd: None,
            shell_pgid: unistd::getpgrp(),
            shell_tmodes: None,
        }
    }

    /// Makes `pgid` the terminal's foreground process group.
    pub fn seize(&self, pgid: Pid) -> Result<()> {
        if let Some(ref fd) = self.fd {
            unistd::tcsetpgrp(fd, pgid)?;
        }
        Ok(())
    }

    /// Puts the shell back in the foreground and restores its terminal modes.
    pub fn reclaim(&self) -> Result<()> {
        self.seize(self.shell_pgid)?;
        if let Some(ref tmodes) = self.shell_tmodes {
            self.restore_modes(tmodes)?;
        }
        Ok(())
    }

    /// Current terminal modes, e.g. of a job that has just stopped.
    pub fn save_modes(&self) -> Option<Termios> {
        self.fd
            .as_ref()
            .and_then(|fd| termios::tcgetattr(fd).ok())
    }

    pub fn restore_modes(&self, tmodes: &Termios) -> Result<()> {
        if let Some(ref fd) = self.fd {
            termios::tcsetattr(fd, SetArg::TCSADRAIN, tmodes)?;
        }
        Ok(())
    }

    /// Records the process group the shell put itself in during job-control start-up.
    pub(crate) fn set_shell_pgid(&mut self, pgid: Pid) {
        self.shell_pgid = pgid;
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(AsRawFd::as_raw_fd)
    }
}

impl fmt::Debug for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "terminal: {:?}\tshell pgid: {}",
            self.raw_fd(),
            self.shell_pgid
        )
    }
}
