//! Processes and jobs, and the state machine that child status changes drive.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use nix::sys::termios::Termios;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::util::JcshExitStatusExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Stopped,
    Completed,
}

impl Default for ProcessStatus {
    fn default() -> Self {
        ProcessStatus::Running
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProcessStatus::Running => write!(f, "Running"),
            ProcessStatus::Stopped => write!(f, "Stopped"),
            ProcessStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// One external program invocation within a pipeline.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Process {
    argv: Vec<String>,
    stdin: Option<PathBuf>,
    stdout: Option<PathBuf>,
    /// `id` is None until the process has been forked
    id: Option<Pid>,
    status: ProcessStatus,
    status_code: Option<ExitStatus>,
}

impl Process {
    pub fn new<S: AsRef<str>>(argv: &[S]) -> Self {
        Self {
            argv: argv.iter().map(|arg| arg.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    /// Reads standard input from `path` instead of the inherited or piped stream.
    pub fn with_stdin<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            stdin: Some(path.into()),
            ..self
        }
    }

    /// Writes standard output to `path` instead of the inherited or piped stream.
    pub fn with_stdout<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            stdout: Some(path.into()),
            ..self
        }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    pub fn stdin(&self) -> Option<&Path> {
        self.stdin.as_ref().map(PathBuf::as_path)
    }

    pub fn stdout(&self) -> Option<&Path> {
        self.stdout.as_ref().map(PathBuf::as_path)
    }

    pub fn id(&self) -> Option<Pid> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Pid) {
        self.id = Some(id);
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn status_code(&self) -> Option<ExitStatus> {
        self.status_code
    }

    pub fn is_stopped(&self) -> bool {
        self.status == ProcessStatus::Stopped
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProcessStatus::Completed
    }

    /// Completed with a non-zero status or killed by a signal.
    pub fn has_failed(&self) -> bool {
        self.status_code.map_or(false, |code| !code.success())
    }

    pub fn mark_exited(&mut self, status_code: ExitStatus) {
        self.status = ProcessStatus::Completed;
        self.status_code = Some(status_code);
    }

    pub fn mark_stopped(&mut self) {
        if !self.is_completed() {
            self.status = ProcessStatus::Stopped;
        }
    }

    pub fn mark_running(&mut self) {
        if !self.is_completed() {
            self.status = ProcessStatus::Running;
        }
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))?;
        if let Some(ref stdin) = self.stdin {
            write!(f, " < {}", stdin.display())?;
        }
        if let Some(ref stdout) = self.stdout {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

/// A discrete child status change, as reported by one `waitpid` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessEvent {
    Exited(Pid, i32),
    Signaled(Pid, Signal),
    Stopped(Pid, Signal),
    Continued(Pid),
}

impl ProcessEvent {
    /// Returns `None` for statuses that carry no state change (`StillAlive`, ptrace stops).
    pub fn from_wait_status(wait_status: WaitStatus) -> Option<Self> {
        match wait_status {
            WaitStatus::Exited(pid, code) => Some(ProcessEvent::Exited(pid, code)),
            WaitStatus::Signaled(pid, signal, _) => Some(ProcessEvent::Signaled(pid, signal)),
            WaitStatus::Stopped(pid, signal) => Some(ProcessEvent::Stopped(pid, signal)),
            WaitStatus::Continued(pid) => Some(ProcessEvent::Continued(pid)),
            _ => None,
        }
    }

    pub fn pid(&self) -> Pid {
        match *self {
            ProcessEvent::Exited(pid, _)
            | ProcessEvent::Signaled(pid, _)
            | ProcessEvent::Stopped(pid, _)
            | ProcessEvent::Continued(pid) => pid,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped,
    Completed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Stopped => write!(f, "Stopped"),
            JobStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// A pipeline of processes sharing one process group.
pub struct Job {
    input: String,
    processes: Vec<Process>,
    pgid: Option<Pid>,
    background: bool,
    notified: bool,
    tmodes: Option<Termios>,
}

impl Job {
    pub fn new<S: AsRef<str>>(input: S, processes: Vec<Process>, background: bool) -> Self {
        Self {
            input: input.as_ref().to_string(),
            processes,
            pgid: None,
            background,
            notified: false,
            tmodes: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub(crate) fn processes_mut(&mut self) -> &mut [Process] {
        &mut self.processes
    }

    pub fn pgid(&self) -> Option<Pid> {
        self.pgid
    }

    /// Returns the job's process group, making `pid` its leader if it has none yet.
    pub(crate) fn pgid_or_insert(&mut self, pid: Pid) -> Pid {
        *self.pgid.get_or_insert(pid)
    }

    pub fn is_background(&self) -> bool {
        self.background
    }

    pub fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    pub fn is_notified(&self) -> bool {
        self.notified
    }

    pub fn set_notified(&mut self, notified: bool) {
        self.notified = notified;
    }

    pub(crate) fn tmodes(&self) -> Option<&Termios> {
        self.tmodes.as_ref()
    }

    pub(crate) fn set_tmodes(&mut self, tmodes: Option<Termios>) {
        self.tmodes = tmodes;
    }

    /// Every process has either stopped or completed, and at least one is stopped.
    pub fn is_stopped(&self) -> bool {
        self.processes
            .iter()
            .all(|p| p.is_stopped() || p.is_completed())
            && !self.is_completed()
    }

    pub fn is_completed(&self) -> bool {
        self.processes.iter().all(Process::is_completed)
    }

    /// A completed job failed if its last process failed, as with a shell's `$?`.
    pub fn has_failed(&self) -> bool {
        self.processes.last().map_or(false, Process::has_failed)
    }

    pub fn status(&self) -> JobStatus {
        if self.is_completed() {
            JobStatus::Completed
        } else if self.is_stopped() {
            JobStatus::Stopped
        } else {
            JobStatus::Running
        }
    }

    /// Label shown by `jobs` and in job notifications.
    pub fn label(&self) -> &'static str {
        match self.status() {
            JobStatus::Running if self.background => "Running (bg)",
            JobStatus::Running => "Running (fg)",
            JobStatus::Stopped => "Stopped",
            JobStatus::Completed if self.has_failed() => "Failed",
            JobStatus::Completed => "Completed",
        }
    }

    pub fn has_process(&self, pid: Pid) -> bool {
        self.find_process(pid).is_some()
    }

    /// Applies a status change to the process it concerns.
    ///
    /// Returns `false` if no process in this job has the event's pid.
    pub fn apply(&mut self, event: ProcessEvent) -> bool {
        let process_index = match self.find_process(event.pid()) {
            Some(index) => index,
            None => return false,
        };

        let process = &mut self.processes[process_index];
        match event {
            ProcessEvent::Exited(_, code) => process.mark_exited(ExitStatus::from_status(code)),
            ProcessEvent::Signaled(_, signal) => {
                process.mark_exited(ExitStatus::from_signal(signal))
            }
            ProcessEvent::Stopped(..) => {
                process.mark_stopped();
                // A stopped job is moved to the background so the prompt returns.
                self.notified = true;
                self.background = true;
            }
            ProcessEvent::Continued(_) => process.mark_running(),
        }

        true
    }

    /// Marks every stopped process as running again, after `SIGCONT` was sent.
    pub fn mark_continued(&mut self) {
        for process in &mut self.processes {
            process.mark_running();
        }
    }

    fn find_process(&self, pid: Pid) -> Option<usize> {
        self.processes.iter().position(|p| p.id() == Some(pid))
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pgid: {:?}\tinput: {}", self.pgid, self.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawned_job(pids: &[i32]) -> Job {
        let processes = pids
            .iter()
            .map(|&pid| {
                let mut process = Process::new(&["cmd", "arg1"]);
                process.set_id(Pid::from_raw(pid));
                process
            })
            .collect();
        let mut job = Job::new("cmd arg1 | cmd arg1", processes, false);
        job.pgid_or_insert(Pid::from_raw(pids[0]));
        job
    }

    #[test]
    fn test_new_process() {
        let process = Process::new(&["cmd", "arg1"]).with_stdout("out.txt");
        assert_eq!(process.program(), "cmd");
        assert_eq!(process.id(), None);
        assert_eq!(process.status(), ProcessStatus::Running);
        assert_eq!(process.stdout(), Some(Path::new("out.txt")));
        assert_eq!(process.to_string(), "cmd arg1 > out.txt");
    }

    #[test]
    fn test_job_starts_running() {
        let job = spawned_job(&[100, 101]);
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.label(), "Running (fg)");
        assert!(!job.is_notified());
    }

    #[test]
    fn test_job_is_stopped() {
        let mut job = spawned_job(&[100, 101]);

        assert!(job.apply(ProcessEvent::Stopped(Pid::from_raw(100), Signal::SIGTSTP)));
        assert!(!job.is_stopped());
        assert!(job.is_notified());
        assert!(job.is_background());

        job.apply(ProcessEvent::Stopped(Pid::from_raw(101), Signal::SIGTSTP));
        assert!(job.is_stopped());
        assert_eq!(job.label(), "Stopped");
    }

    #[test]
    fn test_job_continued() {
        let mut job = spawned_job(&[100]);
        job.apply(ProcessEvent::Stopped(Pid::from_raw(100), Signal::SIGSTOP));
        assert_eq!(job.status(), JobStatus::Stopped);

        job.apply(ProcessEvent::Continued(Pid::from_raw(100)));
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn test_job_is_completed() {
        let mut job = spawned_job(&[100, 101]);
        job.apply(ProcessEvent::Exited(Pid::from_raw(100), 0));
        assert!(!job.is_completed());

        job.apply(ProcessEvent::Signaled(Pid::from_raw(101), Signal::SIGTERM));
        assert!(job.is_completed());
        assert!(!job.is_stopped());
        assert!(job.has_failed());
        assert_eq!(job.label(), "Failed");
        assert_eq!(
            job.processes()[1].status_code(),
            Some(ExitStatus::from_status(143))
        );
    }

    #[test]
    fn test_completed_process_is_never_stopped() {
        let mut job = spawned_job(&[100, 101]);
        job.apply(ProcessEvent::Exited(Pid::from_raw(100), 0));
        job.apply(ProcessEvent::Stopped(Pid::from_raw(100), Signal::SIGTSTP));
        assert_eq!(job.processes()[0].status(), ProcessStatus::Completed);

        job.apply(ProcessEvent::Stopped(Pid::from_raw(101), Signal::SIGTSTP));
        assert_eq!(job.status(), JobStatus::Stopped);
    }

    #[test]
    fn test_event_for_unknown_process() {
        let mut job = spawned_job(&[100]);
        assert!(!job.apply(ProcessEvent::Exited(Pid::from_raw(999), 1)));
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn test_mark_continued_resumes_every_process() {
        let mut job = spawned_job(&[100, 101]);
        job.apply(ProcessEvent::Stopped(Pid::from_raw(100), Signal::SIGTSTP));
        job.apply(ProcessEvent::Exited(Pid::from_raw(101), 1));

        job.mark_continued();
        assert_eq!(job.processes()[0].status(), ProcessStatus::Running);
        assert_eq!(job.processes()[1].status(), ProcessStatus::Completed);
    }

    #[test]
    fn test_from_wait_status() {
        let pid = Pid::from_raw(42);
        assert_eq!(
            ProcessEvent::from_wait_status(WaitStatus::Exited(pid, 3)),
            Some(ProcessEvent::Exited(pid, 3))
        );
        assert_eq!(
            ProcessEvent::from_wait_status(WaitStatus::Continued(pid)),
            Some(ProcessEvent::Continued(pid))
        );
        assert_eq!(ProcessEvent::from_wait_status(WaitStatus::StillAlive), None);
    }
}
