//! Pipeline launcher: forks one process per pipeline stage, wires their
//! standard streams together and places them in the job's process group.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait;
use nix::unistd::{self, ForkResult, Pid};

use crate::errors::{Error, ErrorKind, Result, ResultExt};
use crate::job::{Job, Process};
use crate::shell::terminal::Terminal;
use crate::util::JcshExitStatusExt;

const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
const COMMAND_NOT_EXECUTABLE_EXIT_STATUS: i32 = 126;
const REDIRECT_FAILED_EXIT_STATUS: i32 = 1;

/// Signals the shell ignores or handles itself; children get the defaults back.
const JOB_CONTROL_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

/// Descriptors a stage inherits from the pipeline, before redirections.
#[derive(Clone, Copy, Debug)]
struct StageIo {
    /// Read end of the previous stage's pipe; `None` for the first stage.
    stdin: Option<RawFd>,
    /// Write end of this stage's pipe; `None` for the last stage.
    stdout: Option<RawFd>,
    /// Read end of this stage's pipe, which belongs to the next stage.
    next_stdin: Option<RawFd>,
}

/// Spawns every process of `job`, in pipeline order.
///
/// With job control, the first process becomes the leader of a new process
/// group that the others join, and a foreground job's group is given the
/// terminal. If a pipe or a fork fails, the stages already running are killed
/// and reaped, and only this job fails.
pub fn spawn_processes(
    job: &mut Job,
    foreground: bool,
    terminal: &Terminal,
    job_control: bool,
) -> Result<()> {
    if job.processes().is_empty() || job.processes().iter().any(|p| p.argv().is_empty()) {
        return Err(Error::syntax(job.input()));
    }

    // Everything the children need is allocated before the first fork.
    let argvs = job
        .processes()
        .iter()
        .map(|p| to_cstrings(p.argv()))
        .collect::<Result<Vec<_>>>()?;

    let result = spawn_stages(job, &argvs, foreground, terminal, job_control);
    if let Err(ref e) = result {
        warn!("failed to launch '{}': {}", job.input(), e);
        abort_spawned_processes(job);
        let temp_result = terminal.reclaim();
        log_if_err!(temp_result, "failed to reclaim terminal after failed launch");
    }

    result.chain_err(|| ErrorKind::Launch(job.input().to_string()))
}

fn spawn_stages(
    job: &mut Job,
    argvs: &[Vec<CString>],
    foreground: bool,
    terminal: &Terminal,
    job_control: bool,
) -> Result<()> {
    let mut previous_read: Option<OwnedFd> = None;

    for (index, argv) in argvs.iter().enumerate() {
        let pipe = if index + 1 < argvs.len() {
            Some(unistd::pipe()?)
        } else {
            None
        };

        let stage_io = StageIo {
            stdin: previous_read.as_ref().map(AsRawFd::as_raw_fd),
            stdout: pipe.as_ref().map(|(_, write)| write.as_raw_fd()),
            next_stdin: pipe.as_ref().map(|(read, _)| read.as_raw_fd()),
        };

        match unsafe { unistd::fork() }? {
            ForkResult::Child => {
                let pgid = if job_control { job.pgid() } else { None };
                exec_process(
                    &job.processes()[index],
                    argv,
                    stage_io,
                    pgid,
                    foreground,
                    terminal,
                    job_control,
                )
            }
            ForkResult::Parent { child } => {
                job.processes_mut()[index].set_id(child);
                if job_control {
                    let pgid = job.pgid_or_insert(child);
                    join_process_group(child, pgid);
                }
                debug!(
                    "spawned {} ({}) in process group {:?}",
                    job.processes()[index].program(),
                    child,
                    job.pgid()
                );
            }
        }

        // The child holds its own copies now; dropping ours closes the write
        // end so the next stage sees end-of-input once this stage exits.
        previous_read = pipe.map(|(read, _write)| read);
    }

    Ok(())
}

/// Runs in the forked child; never returns.
fn exec_process(
    process: &Process,
    argv: &[CString],
    stage_io: StageIo,
    pgid: Option<Pid>,
    foreground: bool,
    terminal: &Terminal,
    job_control: bool,
) -> ! {
    if let Some(fd) = stage_io.stdin {
        let _ = unistd::dup2(fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = stage_io.stdout {
        let _ = unistd::dup2(fd, libc::STDOUT_FILENO);
    }
    for fd in [stage_io.stdin, stage_io.stdout, stage_io.next_stdin]
        .iter()
        .flatten()
    {
        if *fd > libc::STDERR_FILENO {
            let _ = unistd::close(*fd);
        }
    }

    // Redirections are applied after the pipe wiring, so they take priority.
    if let Err(e) = redirect_stdio(process) {
        eprintln!("jcsh: {}", e.to_chain_string());
        exit_child(REDIRECT_FAILED_EXIT_STATUS);
    }

    if job_control {
        // The parent does the same after fork returns; whichever runs first
        // establishes the group before either side depends on it.
        let pid = unistd::getpid();
        let pgid = pgid.unwrap_or(pid);
        let _ = unistd::setpgid(pid, pgid);
        if foreground {
            let _ = terminal.seize(pgid);
        }
    }

    for &sig in JOB_CONTROL_SIGNALS.iter() {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }

    let error = match unistd::execvp(&argv[0], argv) {
        Ok(never) => match never {},
        Err(error) => error,
    };
    if error == Errno::ENOENT {
        eprintln!("jcsh: {}: command not found", process.program());
        exit_child(COMMAND_NOT_FOUND_EXIT_STATUS);
    } else {
        eprintln!("jcsh: {}: {}", process.program(), error.desc());
        exit_child(COMMAND_NOT_EXECUTABLE_EXIT_STATUS);
    }
}

fn redirect_stdio(process: &Process) -> Result<()> {
    if let Some(path) = process.stdin() {
        let file = File::open(path).chain_err(|| path.display().to_string())?;
        unistd::dup2(file.as_raw_fd(), libc::STDIN_FILENO)?;
    }

    if let Some(path) = process.stdout() {
        let file = create_output_file(path)?;
        unistd::dup2(file.as_raw_fd(), libc::STDOUT_FILENO)?;
    }

    Ok(())
}

/// Opens the target of a `>` redirection, truncating it.
pub(crate) fn create_output_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .chain_err(|| path.display().to_string())
}

/// Leaves the child without running the shell's exit handlers or flushing
/// output the shell had buffered before the fork.
fn exit_child(code: i32) -> ! {
    unsafe { libc::_exit(code) }
}

fn join_process_group(pid: Pid, pgid: Pid) {
    // EACCES: the child already called exec, after setting its group itself.
    // ESRCH: the child already exited.
    match unistd::setpgid(pid, pgid) {
        Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("failed to set pgid ({}) for pid ({}): {}", pgid, pid, e),
    }
}

/// Kills and reaps the stages of a partially launched job.
fn abort_spawned_processes(job: &mut Job) {
    for process in job.processes_mut() {
        let pid = match process.id() {
            Some(pid) if !process.is_completed() => pid,
            _ => continue,
        };

        let temp_result = signal::kill(pid, Signal::SIGKILL);
        log_if_err!(temp_result, "failed to kill ({})", pid);
        let temp_result = wait::waitpid(pid, None);
        log_if_err!(temp_result, "failed to reap ({})", pid);
        process.mark_exited(std::process::ExitStatus::from_signal(Signal::SIGKILL));
    }
}

fn to_cstrings(argv: &[String]) -> Result<Vec<CString>> {
    argv.iter()
        .map(|arg| {
            CString::new(arg.as_bytes())
                .chain_err(|| format!("{}: argument contains a NUL byte", arg))
        })
        .collect()
}
