//! Decorated terminal output on stderr. Stdout carries only JSON documents.

mod banner;
mod error;
mod progress;
mod tables;

pub use banner::{banner_for_help, print_banner};
pub use error::print_error;
pub use progress::{Phase, Progress};
pub use tables::{print_batch_info, print_charge_balance, print_parametrization};

use std::io::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    /// Banner, spinners and tables are drawn only when set.
    pub interactive: bool,
}

impl Context {
    /// Interactive when stderr is a terminal and `--quiet` was not given.
    pub fn for_stderr(quiet: bool) -> Self {
        Self {
            interactive: !quiet && std::io::stderr().is_terminal(),
        }
    }
}
