/// Greedy word wrap: keep adding words to the current line until the next one
/// would push it past `max_width`, then start a new line.
///
/// `measure` returns the rendered width of a string in the same unit as
/// `max_width`. A word wider than the budget on its own is split between
/// characters. Empty or whitespace-only text produces no lines.
pub fn wrap_text<F>(text: &str, max_width: u32, measure: F) -> Vec<String>
where
    F: Fn(&str) -> u32,
{
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if measure(&candidate) <= max_width {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }

        if measure(word) <= max_width {
            current = word.to_string();
            continue;
        }

        for ch in word.chars() {
            let mut next = current.clone();
            next.push(ch);
            if measure(&next) > max_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            current.push(ch);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Keep at most `max_lines` lines. When text is dropped, the last kept line
/// ends in "..." and still fits `max_width`.
pub fn clip_lines<F>(
    mut lines: Vec<String>,
    max_lines: usize,
    max_width: u32,
    measure: F,
) -> Vec<String>
where
    F: Fn(&str) -> u32,
{
    if lines.len() <= max_lines {
        return lines;
    }
    lines.truncate(max_lines);
    if let Some(last) = lines.last_mut() {
        loop {
            let candidate = format!("{}...", last.trim_end());
            if last.is_empty() || measure(&candidate) <= max_width {
                *last = candidate;
                break;
            }
            last.pop();
        }
    }
    lines
}
