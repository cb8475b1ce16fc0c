use std::io::{self, Write};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// Phases shared by the batch commands, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Read,
    Model,
    Predict,
    Write,
}

impl Phase {
    const ALL: [Phase; 4] = [Phase::Read, Phase::Model, Phase::Predict, Phase::Write];

    fn label(self) -> &'static str {
        match self {
            Phase::Read => "Read input",
            Phase::Model => "Build model",
            Phase::Predict => "Predict coefficients",
            Phase::Write => "Write output",
        }
    }

    fn ordinal(self) -> usize {
        Self::ALL.iter().position(|&p| p == self).map_or(0, |i| i + 1)
    }
}

/// Reports phases of a command run over a batch of molecules.
///
/// Non-interactive runs only emit `debug!` events.
pub struct Progress {
    interactive: bool,
    spinner: Option<ProgressBar>,
    molecules: usize,
    started: Instant,
    phase_started: Instant,
}

impl Progress {
    pub fn new(interactive: bool) -> Self {
        let now = Instant::now();
        Self {
            interactive,
            spinner: None,
            molecules: 0,
            started: now,
            phase_started: now,
        }
    }

    /// Sets the batch size shown from the next phase on.
    pub fn set_molecules(&mut self, molecules: usize) {
        self.molecules = molecules;
    }

    pub fn begin(&mut self, phase: Phase) {
        self.clear();
        self.phase_started = Instant::now();

        let message = format!(
            "[{}/{}] {}",
            phase.ordinal(),
            Phase::ALL.len(),
            self.describe(phase)
        );
        if !self.interactive {
            tracing::debug!("{}", message);
            return;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        bar.set_message(message);
        self.spinner = Some(bar);
    }

    pub fn end(&mut self, phase: Phase, details: &[String]) {
        self.clear();
        if !self.interactive {
            return;
        }
        let mut stderr = io::stderr().lock();
        let _ = writeln!(
            stderr,
            "  \x1b[32m✓\x1b[0m {:<44} {:>5.1}s",
            self.describe(phase),
            self.phase_started.elapsed().as_secs_f64()
        );
        for line in details {
            let _ = writeln!(stderr, "      \x1b[2m·\x1b[0m {}", line);
        }
    }

    pub fn finish(mut self, label: &str) {
        self.clear();
        if !self.interactive {
            return;
        }
        let summary = summary_line(self.molecules, self.started.elapsed());
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr);
        let _ = writeln!(stderr, "  \x1b[32m✓\x1b[0m {:<22} {:>27}", label, summary);
        let _ = writeln!(stderr);
    }

    fn describe(&self, phase: Phase) -> String {
        match self.molecules {
            0 => phase.label().to_string(),
            1 => format!("{} (1 molecule)", phase.label()),
            n => format!("{} ({} molecules)", phase.label(), n),
        }
    }

    fn clear(&mut self) {
        if let Some(bar) = self.spinner.take() {
            bar.finish_and_clear();
        }
    }
}

fn summary_line(molecules: usize, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if molecules == 0 || secs <= 0.0 {
        format!("Total: {:.2}s", secs)
    } else {
        format!("{:.2}s, {:.1} mol/s", secs, molecules as f64 / secs)
    }
}
