use std::collections::HashMap;
use std::io::{self, Write};

use density_forge::{Element, Molecule, Parametrization};

use crate::util::text::truncate;

const INDENT: &str = "      ";

const BOX_INNER_WIDTH: usize = 62;
const SAFE_TABLE_WIDTH: usize = BOX_INNER_WIDTH - INDENT.len();
const MAX_ROWS: usize = 15;

pub fn print_batch_info(molecules: &[Molecule]) {
    let stderr = io::stderr();
    let mut out = stderr.lock();

    let atoms: usize = molecules.iter().map(Molecule::atom_count).sum();
    let bonds: usize = molecules.iter().map(Molecule::bond_count).sum();
    let max_atoms = molecules.iter().map(Molecule::atom_count).max().unwrap_or(0);
    let max_bonds = molecules.iter().map(Molecule::bond_count).max().unwrap_or(0);

    let rows = vec![
        ("Molecules", format!("{}", molecules.len())),
        ("Total Atoms", format!("{}", atoms)),
        ("Total Bonds", format!("{}", bonds)),
        ("Padded Shape", format!("{} atoms × {} bonds", max_atoms, max_bonds)),
    ];

    print_kv_table(&mut out, "Batch Summary", &rows);
    print_element_distribution(&mut out, molecules);
}

fn print_element_distribution(out: &mut impl Write, molecules: &[Molecule]) {
    let mut element_counts: HashMap<Element, usize> = HashMap::new();
    for atom in molecules.iter().flat_map(|m| &m.atoms) {
        *element_counts.entry(atom.element).or_insert(0) += 1;
    }

    let total: usize = element_counts.values().sum();
    if total == 0 {
        return;
    }
    let mut sorted: Vec<_> = element_counts
        .into_iter()
        .map(|(e, c)| (e.symbol().to_string(), c))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    print_distribution_table(out, "Element Distribution", &sorted, total);
}

fn print_distribution_table(
    out: &mut impl Write,
    title: &str,
    data: &[(String, usize)],
    total: usize,
) {
    let name_w = 10usize;
    let count_w = 8usize;
    let sep_overhead = 6;
    let dist_w = SAFE_TABLE_WIDTH.saturating_sub(name_w + count_w + sep_overhead);
    let max_bar_width = dist_w.saturating_sub(8).min(20);

    print_title(out, title);
    print_rule(out, '┌', '┬', '┐', &[name_w, count_w, dist_w]);
    let _ = writeln!(
        out,
        "{}│ {:<name_w$} │ {:>count_w$} │ {:<dist_w$} │",
        INDENT, "Element", "Atoms", "Distribution"
    );
    print_rule(out, '├', '┼', '┤', &[name_w, count_w, dist_w]);

    for (name, count) in data.iter().take(MAX_ROWS) {
        let pct = (*count as f64 / total as f64) * 100.0;
        let dist_cell = format!("{}  {:>5.1}%", make_bar(pct, max_bar_width), pct);
        let _ = writeln!(
            out,
            "{}│ {:<name_w$} │ {:>count_w$} │ {:<dist_w$} │",
            INDENT,
            truncate(name, name_w),
            count,
            dist_cell
        );
    }

    print_rule(out, '└', '┴', '┘', &[name_w, count_w, dist_w]);
}

/// Target and predicted electron counts, one row per molecule.
pub fn print_charge_balance(rows: &[(f64, f64)]) {
    let stderr = io::stderr();
    let mut out = stderr.lock();

    let idx_w = 8usize;
    let num_w = (SAFE_TABLE_WIDTH.saturating_sub(idx_w + 10)) / 3;

    print_title(&mut out, "Charge Balance");
    print_rule(&mut out, '┌', '┬', '┐', &[idx_w, num_w, num_w, num_w]);
    let _ = writeln!(
        out,
        "{}│ {:<idx_w$} │ {:>num_w$} │ {:>num_w$} │ {:>num_w$} │",
        INDENT, "Molecule", "Target", "Predicted", "Deviation"
    );
    print_rule(&mut out, '├', '┼', '┤', &[idx_w, num_w, num_w, num_w]);

    for (idx, (target, predicted)) in rows.iter().enumerate().take(MAX_ROWS) {
        let _ = writeln!(
            out,
            "{}│ {:<idx_w$} │ {:>num_w$.4} │ {:>num_w$.4} │ {:>num_w$.2e} │",
            INDENT,
            idx,
            target,
            predicted,
            predicted - target
        );
    }

    if rows.len() > MAX_ROWS {
        let _ = writeln!(
            out,
            "{}│ {:<idx_w$} │ {:>num_w$} │ {:>num_w$} │ {:>num_w$} │",
            INDENT,
            "...",
            "",
            "",
            format!("({} more)", rows.len() - MAX_ROWS)
        );
    }

    print_rule(&mut out, '└', '┴', '┘', &[idx_w, num_w, num_w, num_w]);
}

pub fn print_parametrization(result: &Parametrization) {
    use density_forge::FunctionKind;

    let stderr = io::stderr();
    let mut out = stderr.lock();

    let count = |kind: FunctionKind| result.functions.iter().filter(|f| f.kind == kind).count();
    let filled = result
        .functions
        .iter()
        .filter(|f| f.kind != FunctionKind::Core && f.coefficient.is_some())
        .count();

    let rows = vec![
        ("Core Functions", format!("{}", count(FunctionKind::Core))),
        ("Atom Functions", format!("{}", count(FunctionKind::Iso))),
        ("Bond Functions", format!("{}", count(FunctionKind::Aniso))),
        ("Coefficients", format!("{}", filled)),
        ("Unmatched", format!("{}", result.warnings.len())),
        ("Target (e)", format!("{:.4}", result.target)),
    ];

    print_kv_table(&mut out, "Parametrization", &rows);
}

fn print_kv_table(out: &mut impl Write, title: &str, rows: &[(&str, String)]) {
    let key_w = 16usize;
    let sep_overhead = 6;
    let val_w = SAFE_TABLE_WIDTH.saturating_sub(key_w + sep_overhead);

    print_title(out, title);
    print_rule(out, '┌', '┬', '┐', &[key_w, val_w]);
    let _ = writeln!(
        out,
        "{}│ {:<key_w$} │ {:>val_w$} │",
        INDENT, "Metric", "Value"
    );
    print_rule(out, '├', '┼', '┤', &[key_w, val_w]);

    for (key, val) in rows {
        let _ = writeln!(
            out,
            "{}│ {:<key_w$} │ {:>val_w$} │",
            INDENT,
            truncate(key, key_w),
            truncate(val, val_w)
        );
    }

    print_rule(out, '└', '┴', '┘', &[key_w, val_w]);
}

fn print_title(out: &mut impl Write, title: &str) {
    let _ = writeln!(
        out,
        "{}┌─ {} ─┐",
        INDENT,
        truncate(title, SAFE_TABLE_WIDTH - 6)
    );
}

fn print_rule(out: &mut impl Write, left: char, mid: char, right: char, widths: &[usize]) {
    let cells: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    let _ = writeln!(
        out,
        "{}{}{}{}",
        INDENT,
        left,
        cells.join(&mid.to_string()),
        right
    );
}

fn make_bar(pct: f64, max_width: usize) -> String {
    let filled = ((pct / 100.0) * max_width as f64).round() as usize;
    let empty = max_width.saturating_sub(filled);
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(make_bar(50.0, 4), "██░░");
        assert_eq!(make_bar(0.0, 3), "░░░");
        assert_eq!(make_bar(100.0, 2), "██");
    }
}
