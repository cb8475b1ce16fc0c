use std::io::{self, Write};

use anyhow::Error;

use crate::util::text::wrap;

#[rustfmt::skip]
pub fn print_error(err: &Error) {
    let mut stderr = io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "   ╔══════════════════════════════════════════════════════════════╗");
    let _ = writeln!(stderr, "   ║  ✗ Error                                                     ║");
    let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");

    for line in wrap(&err.to_string(), 59) {
        let _ = writeln!(stderr, "   ║  {:<59} ║", line);
    }

    let mut source = err.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Caused by:                                                  ║");
        for line in wrap(&cause.to_string(), 57) {
            let _ = writeln!(stderr, "   ║    {:<57} ║", line);
        }
        source = cause.source();
    }

    let hints = collect_hints(err);
    if !hints.is_empty() {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Hints:                                                      ║");
        for hint in hints {
            let wrapped = wrap(&hint, 55);
            if let Some((first, rest)) = wrapped.split_first() {
                let _ = writeln!(stderr, "   ║    • {:<55} ║", first);
                for line in rest {
                    let _ = writeln!(stderr, "   ║      {:<55} ║", line);
                }
            }
        }
    }

    let _ = writeln!(stderr, "   ╚══════════════════════════════════════════════════════════════╝");
    let _ = writeln!(stderr);
}

fn collect_hints(err: &Error) -> Vec<String> {
    let mut hints = Vec::new();

    let typed = forge_hints(err, &mut hints)
        || json_hints(err, &mut hints)
        || io_hints(err, &mut hints);

    if !typed {
        fallback_hints(err, &mut hints);
    }
    hints
}

fn forge_hints(err: &Error, hints: &mut Vec<String>) -> bool {
    use density_forge::ForgeError;

    let Some(forge_err) = err.chain().find_map(|e| e.downcast_ref::<ForgeError>()) else {
        return false;
    };

    match forge_err {
        ForgeError::Shape { context, .. } => {
            hints.push(format!("Array dimensions disagree in {}", context));
            hints.push("Feature rows must match --config's common network input width".into());
            hints.push("Integral rows must match the atom and bond function counts".into());
        }

        ForgeError::UnknownCategory { code } => {
            hints.push(format!(
                "Atomic number {} has no networks in this model",
                code
            ));
            hints.push("Add the element to `elements` in the model configuration".into());
        }

        ForgeError::DegenerateConstraint { example, .. } => {
            hints.push(format!(
                "Molecule {} cannot be normalized to its electron count",
                example
            ));
            hints.push("Check that its integrals are not all zero".into());
            hints.push("Or rerun with --normalization none to inspect raw output".into());
        }

        ForgeError::InvalidIndex { example, slot, .. } => {
            hints.push(format!(
                "Molecule {} has an out-of-range index at position {}",
                example, slot
            ));
            hints.push("Bond endpoints and function centers must address existing atoms".into());
        }

        ForgeError::InvalidArchitecture(_) => {
            hints.push("Layer widths in the model configuration do not chain".into());
            hints.push("The bond input width is 2 x common output + pair features".into());
        }

        ForgeError::ConfigParse(_) => {
            hints.push("Model configuration has invalid TOML syntax".into());
            hints.push("Check for missing quotes, brackets, or unknown keys".into());
        }

        ForgeError::Weights(_) => {
            hints.push("The weights were saved for a different architecture".into());
            hints.push("Use the configuration the weights were trained with".into());
        }
    }
    true
}

fn json_hints(err: &Error, hints: &mut Vec<String>) -> bool {
    let Some(json_err) = err.chain().find_map(|e| e.downcast_ref::<serde_json::Error>()) else {
        return false;
    };

    hints.push(format!(
        "JSON problem near line {}, column {}",
        json_err.line(),
        json_err.column()
    ));
    if json_err.is_data() {
        hints.push("A field is missing or has the wrong type".into());
        hints.push("Elements are written as symbols, e.g. \"C\" or \"Cl\"".into());
    } else if json_err.is_eof() {
        hints.push("The input ended early; it may be truncated".into());
    }
    true
}

fn io_hints(err: &Error, hints: &mut Vec<String>) -> bool {
    use std::io::ErrorKind;

    let Some(io_err) = err.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) else {
        return false;
    };

    match io_err.kind() {
        ErrorKind::NotFound => {
            hints.push("File or directory not found".into());
            hints.push("Check the path spelling and ensure the file exists".into());
        }

        ErrorKind::PermissionDenied => {
            hints.push("Permission denied accessing the file".into());
            hints.push("Check file permissions with `ls -la`".into());
        }

        ErrorKind::BrokenPipe => {
            hints.push("Broken pipe: output consumer terminated".into());
            hints.push("This may occur when piping to commands like `head`".into());
        }

        _ => {
            hints.push("I/O operation failed".into());
            hints.push("Check file path, permissions, and disk space".into());
        }
    }
    true
}

fn fallback_hints(err: &Error, hints: &mut Vec<String>) {
    let msg = error_chain_text(err);

    if msg.contains("terminal") || msg.contains("stdin") {
        hints.push("Input appears to be from a terminal".into());
        hints.push("Provide input via -i/--input or pipe JSON to stdin".into());
    } else if msg.contains("unmatched") {
        hints.push("Drop --strict to keep going with warnings".into());
    }
}

fn error_chain_text(err: &Error) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase()
}
