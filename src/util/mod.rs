use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// jcsh Utility Extensions for `ExitStatus`
pub trait JcshExitStatusExt {
    /// Create an ExitStatus to indicate *unsuccessful* program execution.
    fn from_failure() -> Self;

    /// Create an ExitStatus from a status code
    fn from_status(code: i32) -> Self;

    /// Create the ExitStatus a shell reports for a process killed by `signal`
    fn from_signal(signal: Signal) -> Self;
}

impl JcshExitStatusExt for ExitStatus {
    /// # Examples
    /// ```rust
    /// use jcsh::JcshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(!ExitStatus::from_failure().success());
    /// ```
    fn from_failure() -> Self {
        ExitStatus::from_status(1)
    }

    /// # Examples
    /// ```rust
    /// use jcsh::JcshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_status(0).success());
    /// assert!(!ExitStatus::from_status(1).success());
    /// ```
    fn from_status(code: i32) -> Self {
        ExitStatus::from_raw((code & 0xff) << 8)
    }

    fn from_signal(signal: Signal) -> Self {
        ExitStatus::from_status(128 + signal as i32)
    }
}
