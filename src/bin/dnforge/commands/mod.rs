mod parametrize;
mod predict;

use parametrize::run_parametrize;
use predict::run_predict;

use anyhow::{Result, bail};

use crate::cli::{Command, IoOptions};
use crate::display::Context;
use crate::io::stdin_is_tty;

pub fn dispatch(command: Command, ctx: Context) -> Result<()> {
    match command {
        Command::Predict(args) => run_predict(args, ctx),
        Command::Parametrize(args) => run_parametrize(args, ctx),
    }
}

fn ensure_input(io: &IoOptions, command: &str) -> Result<()> {
    if io.input.is_none() && stdin_is_tty() {
        bail!(
            "No input file specified and stdin is a terminal.\n\nUsage: dnforge {} -i <INPUT> or pipe JSON via stdin.",
            command
        );
    }
    Ok(())
}

fn output_label(io: &IoOptions) -> String {
    io.output
        .as_ref()
        .map(|p| {
            p.file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "stdout".to_string())
}
