//! JSON documents on files or the standard streams.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, IsTerminal, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub fn stdin_is_tty() -> bool {
    io::stdin().is_terminal()
}

/// Deserializes one JSON document from `path`, or from stdin when `None`.
pub fn read_json<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(p) => {
            let file = File::open(p)
                .with_context(|| format!("Failed to open input file: {}", p.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Malformed JSON in {}", p.display()))
        }
        None => serde_json::from_reader(io::stdin().lock()).context("Malformed JSON on stdin"),
    }
}

/// Pretty-prints `value` to `path`, or to stdout when `None`.
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(p) => {
            let file = File::create(p)
                .with_context(|| format!("Failed to create output file: {}", p.display()))?;
            emit(BufWriter::new(file), value)
        }
        None => emit(io::stdout().lock(), value),
    }
}

fn emit<W: Write, T: Serialize>(mut out: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value).context("Failed to serialize output")?;
    writeln!(out)?;
    out.flush().context("Failed to flush output")
}
