use std::fmt;
use std::process::ExitStatus;

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::errors::{Error, ErrorKind, Result, ResultExt};
use crate::job::{Job, JobStatus, ProcessEvent};
use crate::shell::execute_command::spawn_processes;
use crate::shell::terminal::Terminal;
use crate::util::JcshExitStatusExt;

/// Makes the interactive shell the foreground process group of its terminal
/// and ignores the signals the terminal sends to foreground jobs.
pub fn initialize_job_control(terminal: &mut Terminal) -> Result<()> {
    // Loop until the shell is in the foreground
    loop {
        let shell_pgid = unistd::getpgrp();
        let terminal_pgid = unistd::tcgetpgrp(std::io::stdin()).chain_err(|| "tcgetpgrp")?;
        if terminal_pgid == shell_pgid {
            break;
        }
        signal::killpg(shell_pgid, Signal::SIGTTIN).chain_err(|| "failed to stop shell")?;
    }

    // Ignore interactive and job-control signals
    for &sig in &[
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
    ] {
        unsafe { signal::signal(sig, SigHandler::SigIgn) }?;
    }

    // Put ourselves in our own process group
    let shell_pgid = Pid::this();
    if unistd::getpgrp() != shell_pgid {
        unistd::setpgid(shell_pgid, shell_pgid).chain_err(|| "failed to create process group")?;
    }
    terminal.set_shell_pgid(shell_pgid);

    // Grab control of the terminal
    let temp_result = terminal.seize(shell_pgid);
    log_if_err!(temp_result, "failed to grab control of terminal");

    Ok(())
}

/// The job table: every job the shell launched that has not been reaped and
/// reported yet, in launch order. Users address jobs by 1-based position.
pub struct JobManager {
    jobs: Vec<Job>,
    terminal: Terminal,
    /// Process groups and terminal hand-off are only managed with job control.
    job_control: bool,
    /// Report successful completions and background launches, not just failures.
    display_messages: bool,
}

impl JobManager {
    pub fn new(terminal: Terminal, job_control: bool, display_messages: bool) -> Self {
        Self {
            jobs: Vec::new(),
            terminal,
            job_control,
            display_messages,
        }
    }

    pub fn is_job_control_enabled(&self) -> bool {
        self.job_control
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Live jobs in table order; the job at index `i` has position `i + 1`.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Looks up a job by its 1-based position.
    pub fn get_job(&self, position: usize) -> Option<&Job> {
        position
            .checked_sub(1)
            .and_then(|index| self.jobs.get(index))
    }

    /// Spawns `job`, registers it in the table and, for a foreground job,
    /// waits until it stops or completes.
    pub fn launch(&mut self, mut job: Job) -> Result<()> {
        let foreground = !job.is_background();
        spawn_processes(&mut job, foreground, &self.terminal, self.job_control)?;
        let index = self.register(job);

        if foreground {
            if let Some(pgid) = self.jobs[index].pgid() {
                // The group is fully formed now; hand it the terminal from
                // this side too, in case the children have not done so yet.
                let temp_result = self.terminal.seize(pgid);
                log_if_err!(temp_result, "failed to give terminal to job ({})", pgid);
            }
            self.wait_for_job(index)?;
            self.forget_if_completed(index);
        } else {
            let job = &self.jobs[index];
            info!("started job [{}] in background: {}", index + 1, job.input());
            if self.display_messages {
                let leader = job.pgid().or_else(|| job.processes()[0].id());
                if let Some(leader) = leader {
                    eprintln!("[{}] {}", index + 1, leader);
                }
            }
        }

        Ok(())
    }

    /// Adds a job to the end of the table, returning its index.
    fn register(&mut self, job: Job) -> usize {
        if let Some(pgid) = job.pgid() {
            self.jobs
                .retain(|other| other.pgid() != Some(pgid) || !other.is_completed());
        }
        self.jobs.push(job);
        self.jobs.len() - 1
    }

    /// Waits for the job at `index` to stop or complete.
    ///
    /// Blocks on status changes of *any* child, so other jobs are updated as
    /// their processes report in. Afterwards the shell takes back the terminal.
    pub fn wait_for_job(&mut self, index: usize) -> Result<()> {
        while self.jobs[index].status() == JobStatus::Running {
            let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
            match wait::waitpid(None, Some(flags)) {
                Ok(wait_status) => {
                    if let Some(event) = ProcessEvent::from_wait_status(wait_status) {
                        self.handle_event(event);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    warn!("no children left while waiting for job [{}]", index + 1);
                    self.mark_job_orphaned(index);
                }
                Err(e) => return Err(e).chain_err(|| "waitpid"),
            }
        }

        if self.jobs[index].is_stopped() {
            let tmodes = self.terminal.save_modes();
            self.jobs[index].set_tmodes(tmodes);
        }
        debug!(
            "job [{}] is {}, putting shell back into foreground",
            index + 1,
            self.jobs[index].status()
        );
        let temp_result = self.terminal.reclaim();
        log_if_err!(temp_result, "failed to reclaim terminal");
        Ok(())
    }

    /// Drives the state machine with one child status change.
    ///
    /// Returns the index of the job this event left fully stopped, after its
    /// stop notice has been printed.
    fn handle_event(&mut self, event: ProcessEvent) -> Option<usize> {
        debug!("{:?}", event);
        let index = match self.jobs.iter().position(|job| job.has_process(event.pid())) {
            Some(index) => index,
            None => {
                debug!("status change for unknown child ({})", event.pid());
                return None;
            }
        };

        let was_stopped = self.jobs[index].is_stopped();
        self.jobs[index].apply(event);
        let job = &self.jobs[index];

        match event {
            ProcessEvent::Exited(pid, _) | ProcessEvent::Signaled(pid, _) => {
                if let Some(process) = job.processes().iter().find(|p| p.id() == Some(pid)) {
                    if process.has_failed() {
                        eprintln!("{} (Failed): {}", pid, process.program());
                    } else if self.display_messages {
                        eprintln!("{} (Completed): {}", pid, process.program());
                    }
                }
            }
            ProcessEvent::Stopped(..) if !job.is_stopped() => {
                // Suspend the rest of the group too, so the whole job stops.
                if let Some(pgid) = job.pgid() {
                    let temp_result = signal::killpg(pgid, Signal::SIGSTOP);
                    log_if_err!(temp_result, "failed to stop job ({})", pgid);
                }
            }
            _ => {}
        }

        if was_stopped || !job.is_stopped() {
            return None;
        }
        eprintln!("{}", format_job(index + 1, job));
        Some(index)
    }

    /// `ECHILD`: the job's processes were reaped elsewhere.
    fn mark_job_orphaned(&mut self, index: usize) {
        for process in self.jobs[index].processes_mut() {
            if !process.is_completed() {
                process.mark_exited(ExitStatus::from_failure());
            }
        }
    }

    fn forget_if_completed(&mut self, index: usize) {
        if self.jobs[index].is_completed() {
            let job = self.jobs.remove(index);
            debug!("removed completed job: {:?}", job);
        }
    }

    /// Checks for processes that have status information available, without
    /// blocking.
    pub fn update_job_statuses(&mut self) -> Result<()> {
        let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED | WaitPidFlag::WNOHANG;
        loop {
            match wait::waitpid(None, Some(flags)) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return Ok(()),
                Ok(wait_status) => {
                    if let Some(event) = ProcessEvent::from_wait_status(wait_status) {
                        self.handle_event(event);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).chain_err(|| "waitpid"),
            }
        }
    }

    /// Notify the user about stopped or terminated jobs and remove terminated
    /// jobs from the active job list.
    pub fn do_job_notification(&mut self) {
        let temp_result = self.update_job_statuses();
        log_if_err!(temp_result, "do_job_notification");

        for (index, job) in self.jobs.iter().enumerate() {
            if job.is_completed() && (self.display_messages || job.has_failed()) {
                eprintln!("{}", format_job(index + 1, job));
            }
        }

        // Remove completed jobs
        self.jobs.retain(|job| !job.is_completed());
    }

    /// `bg`: resumes a job without giving it the terminal.
    pub fn put_job_in_background(&mut self, position: usize) -> Result<()> {
        self.ensure_job_control()?;
        let index = self.find_job(position)?;
        if self.jobs[index].is_completed() {
            return Err(ErrorKind::JobCompleted(position).into());
        }
        debug!("putting job [{}] in background", position);

        self.continue_job(index)?;
        let job = &mut self.jobs[index];
        job.set_background(true);
        job.set_notified(false);
        Ok(())
    }

    /// `fg`: resumes a job with the terminal and waits for it.
    ///
    /// Without a position the most recently added job is used. A job named by
    /// position must have been stopped, and must not have completed.
    pub fn put_job_in_foreground(&mut self, position: Option<usize>) -> Result<()> {
        self.ensure_job_control()?;
        let index = match position {
            Some(position) => {
                let index = self.find_job(position)?;
                if !self.jobs[index].is_notified() {
                    return Err(ErrorKind::JobNotStopped(position).into());
                }
                index
            }
            None => self
                .jobs
                .len()
                .checked_sub(1)
                .ok_or_else(|| Error::from(ErrorKind::NoCurrentJob))?,
        };
        if self.jobs[index].is_completed() {
            return Err(ErrorKind::JobCompleted(index + 1).into());
        }
        debug!("putting job [{}] in foreground", index + 1);

        if let Some(pgid) = self.jobs[index].pgid() {
            let temp_result = self.terminal.seize(pgid);
            log_if_err!(temp_result, "failed to give terminal to job ({})", pgid);
        }
        if let Some(tmodes) = self.jobs[index].tmodes() {
            let temp_result = self.terminal.restore_modes(tmodes);
            log_if_err!(temp_result, "error setting terminal modes for job [{}]", index + 1);
        }

        self.continue_job(index)?;
        {
            let job = &mut self.jobs[index];
            job.set_background(false);
            job.set_notified(false);
        }
        self.wait_for_job(index)?;
        self.forget_if_completed(index);
        Ok(())
    }

    /// `kill`: asks every process of a job to terminate.
    pub fn kill_job(&mut self, position: usize) -> Result<&Job> {
        let index = self.find_job(position)?;
        self.signal_job(index, Signal::SIGTERM)?;
        // A stopped job only acts on SIGTERM once it runs again.
        if self.jobs[index].is_stopped() {
            self.continue_job(index)?;
        }
        Ok(&self.jobs[index])
    }

    /// Sends `SIGCONT` and marks every stopped process as running.
    fn continue_job(&mut self, index: usize) -> Result<()> {
        self.signal_job(index, Signal::SIGCONT)?;
        self.jobs[index].mark_continued();
        Ok(())
    }

    /// Signals the job's process group, or each process if it has none.
    fn signal_job(&self, index: usize, sig: Signal) -> Result<()> {
        let job = &self.jobs[index];
        if let Some(pgid) = job.pgid() {
            return signal::killpg(pgid, sig).chain_err(|| format!("kill({})", sig));
        }

        for process in job.processes().iter().filter(|p| !p.is_completed()) {
            if let Some(pid) = process.id() {
                signal::kill(pid, sig).chain_err(|| format!("kill({})", sig))?;
            }
        }
        Ok(())
    }

    fn ensure_job_control(&self) -> Result<()> {
        if self.job_control {
            Ok(())
        } else {
            Err(ErrorKind::NoJobControl.into())
        }
    }

    fn find_job(&self, position: usize) -> Result<usize> {
        if position == 0 || position > self.jobs.len() {
            return Err(Error::no_such_job(position.to_string()));
        }
        Ok(position - 1)
    }
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} jobs\t{:?}", self.jobs.len(), self.terminal)?;
        for job in &self.jobs {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}

/// One line of `jobs` output, e.g. `[1] Running (bg)	sleep 30`.
pub fn format_job(position: usize, job: &Job) -> String {
    format!("[{}] {}\t{}", position, job.label(), job.input())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::parser;

    lazy_static! {
        /// `waitpid(-1)` reaps any child of the test process, so tests that
        /// fork must not overlap.
        pub static ref FORK_LOCK: Mutex<()> = Mutex::new(());
    }

    fn process_group_of(pid: Pid) -> Option<Pid> {
        unistd::getpgid(Some(pid)).ok()
    }

    fn job_manager() -> JobManager {
        JobManager::new(Terminal::detached(), true, false)
    }

    fn parse_one(line: &str) -> Job {
        parser::parse(line).unwrap().pop().unwrap()
    }

    #[test]
    fn test_foreground_job_is_removed_once_completed() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("true | false")).unwrap();
        assert!(!manager.has_jobs());
    }

    #[test]
    fn test_failed_background_job_is_reported_then_removed() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("false &")).unwrap();
        assert_eq!(manager.jobs().len(), 1);

        manager.wait_for_job(0).unwrap();
        let job = manager.get_job(1).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.label(), "Failed");

        manager.do_job_notification();
        assert!(!manager.has_jobs());
    }

    #[test]
    fn test_stop_bg_and_complete() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("sleep 30 &")).unwrap();
        let pgid = manager.get_job(1).unwrap().pgid().unwrap();
        assert_eq!(process_group_of(pgid), Some(pgid));

        signal::killpg(pgid, Signal::SIGSTOP).unwrap();
        manager.wait_for_job(0).unwrap();
        {
            let job = manager.get_job(1).unwrap();
            assert_eq!(job.status(), JobStatus::Stopped);
            assert!(job.is_notified());
            assert!(job.is_background());
            assert_eq!(format_job(1, job), "[1] Stopped\tsleep 30");
        }

        manager.put_job_in_background(1).unwrap();
        {
            let job = manager.get_job(1).unwrap();
            assert_eq!(job.status(), JobStatus::Running);
            assert!(!job.is_notified());
            assert_eq!(format_job(1, job), "[1] Running (bg)\tsleep 30");
        }

        manager.kill_job(1).unwrap();
        manager.wait_for_job(0).unwrap();
        {
            let job = manager.get_job(1).unwrap();
            assert_eq!(job.status(), JobStatus::Completed);
            assert!(!job.is_stopped());
        }

        manager.do_job_notification();
        assert!(!manager.has_jobs());
    }

    #[test]
    fn test_stop_notice_waits_for_whole_job() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("sleep 5 | sleep 5 &")).unwrap();
        let first = manager.jobs()[0].processes()[0].id().unwrap();

        signal::kill(first, Signal::SIGSTOP).unwrap();
        let mut notices = Vec::new();
        while manager.jobs()[0].status() == JobStatus::Running {
            let wait_status = wait::waitpid(None, Some(WaitPidFlag::WUNTRACED)).unwrap();
            let event = ProcessEvent::from_wait_status(wait_status).unwrap();
            if let Some(index) = manager.handle_event(event) {
                notices.push(format_job(index + 1, &manager.jobs()[index]));
            }
        }

        assert_eq!(notices, vec!["[1] Stopped\tsleep 5 | sleep 5".to_string()]);
        manager.kill_job(1).unwrap();
        manager.wait_for_job(0).unwrap();
        manager.do_job_notification();
        assert!(!manager.has_jobs());
    }

    #[test]
    fn test_stopping_one_member_stops_the_group() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("sleep 5 | sleep 5 &")).unwrap();
        let last = manager.jobs()[0].processes()[1].id().unwrap();

        signal::kill(last, Signal::SIGSTOP).unwrap();
        manager.wait_for_job(0).unwrap();
        {
            let job = manager.get_job(1).unwrap();
            assert_eq!(job.status(), JobStatus::Stopped);
            assert!(job.processes().iter().all(|p| p.is_stopped()));
        }

        // The table follows the SIGCONT right away, so the wait has to block.
        manager.kill_job(1).unwrap();
        assert_eq!(manager.get_job(1).unwrap().status(), JobStatus::Running);
        manager.wait_for_job(0).unwrap();
        {
            let job = manager.get_job(1).unwrap();
            assert_eq!(job.status(), JobStatus::Completed);
            assert_eq!(
                job.processes()[0].status_code(),
                Some(ExitStatus::from_signal(Signal::SIGTERM))
            );
        }
        manager.do_job_notification();
    }

    #[test]
    fn test_wait_without_children_marks_job_completed() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("true &")).unwrap();
        let pid = manager.jobs()[0].processes()[0].id().unwrap();

        // Reaped behind the job table's back
        wait::waitpid(pid, None).unwrap();
        manager.wait_for_job(0).unwrap();

        let job = manager.get_job(1).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.has_failed());
        manager.do_job_notification();
        assert!(!manager.has_jobs());
    }

    #[test]
    fn test_bg_on_completed_job_is_refused() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("true &")).unwrap();
        manager.wait_for_job(0).unwrap();

        match manager.put_job_in_background(1) {
            Err(Error(ErrorKind::JobCompleted(1), _)) => {}
            other => panic!("expected JobCompleted, got {:?}", other),
        }
        let job = manager.get_job(1).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.is_background());
        manager.do_job_notification();
    }

    #[test]
    fn test_fg_requires_a_stopped_job() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("sleep 30 &")).unwrap();

        match manager.put_job_in_foreground(Some(1)) {
            Err(Error(ErrorKind::JobNotStopped(1), _)) => {}
            other => panic!("expected JobNotStopped, got {:?}", other),
        }

        manager.kill_job(1).unwrap();
        manager.wait_for_job(0).unwrap();
        manager.do_job_notification();
    }

    #[test]
    fn test_fg_resumes_stopped_job_and_waits() {
        let _guard = FORK_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut manager = job_manager();
        manager.launch(parse_one("sleep 1 &")).unwrap();
        let pgid = manager.get_job(1).unwrap().pgid().unwrap();
        signal::killpg(pgid, Signal::SIGSTOP).unwrap();
        manager.wait_for_job(0).unwrap();

        manager.put_job_in_foreground(Some(1)).unwrap();
        assert!(!manager.has_jobs());
    }

    #[test]
    fn test_fg_and_bg_without_jobs() {
        let mut manager = job_manager();
        match manager.put_job_in_foreground(None) {
            Err(Error(ErrorKind::NoCurrentJob, _)) => {}
            other => panic!("expected NoCurrentJob, got {:?}", other),
        }
        match manager.put_job_in_background(1) {
            Err(Error(ErrorKind::NoSuchJob(ref job), _)) => assert_eq!(job, "1"),
            other => panic!("expected NoSuchJob, got {:?}", other),
        }
        assert!(manager.get_job(0).is_none());
    }

    #[test]
    fn test_job_control_disabled() {
        let mut manager = JobManager::new(Terminal::detached(), false, false);
        match manager.put_job_in_foreground(None) {
            Err(Error(ErrorKind::NoJobControl, _)) => {}
            other => panic!("expected NoJobControl, got {:?}", other),
        }
    }
}
