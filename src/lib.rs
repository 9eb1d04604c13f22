//! jcsh - a job-control shell
//!
//! Turns parsed pipelines into process groups, hands the terminal to
//! foreground jobs and tracks every job through its running, stopped and
//! completed states.

#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

/// Logs `$result` at error level if it holds an `Err`.
macro_rules! log_if_err {
    ($result:expr, $fmt:expr) => {{
        if let Err(ref e) = $result {
            error!(concat!($fmt, ": {}"), e);
        }
    }};
    ($result:expr, $fmt:expr, $($arg:tt)*) => {{
        if let Err(ref e) = $result {
            error!(concat!($fmt, ": {}"), $($arg)*, e);
        }
    }};
}

mod editor;
pub mod errors;
pub mod job;
pub mod parser;
pub mod shell;
pub mod util;

pub use crate::shell::{Shell, ShellConfig};
pub use crate::util::JcshExitStatusExt;
