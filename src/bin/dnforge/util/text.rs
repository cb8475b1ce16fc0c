/// Greedy word wrap; never returns an empty list.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for word in text.split_whitespace() {
        match lines.last_mut() {
            Some(line) if line.chars().count() + 1 + word.chars().count() <= width => {
                line.push(' ');
                line.push_str(word);
            }
            _ => lines.push(word.to_string()),
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Shortens `s` to at most `max_len` characters, ending in `…` when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    if max_len == 0 {
        return String::new();
    }

    let mut out: String = s.chars().take(max_len - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_breaks_between_words() {
        assert_eq!(wrap("shape mismatch in kkt", 10), vec!["shape", "mismatch", "in kkt"]);
        assert_eq!(wrap("short", 20), vec!["short"]);
        assert_eq!(wrap("", 5), vec![String::new()]);
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("Element", 10), "Element");
        assert_eq!(truncate("Distribution", 6), "Distr…");
        assert_eq!(truncate("Å×Å×Å", 3), "Å×…");
        assert_eq!(truncate("abc", 0), "");
    }
}
