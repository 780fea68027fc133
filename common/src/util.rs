/// Cuts `label` at the first `separator` and truncates what is left to
/// `max_len` characters, ending in `...` when shortened.
pub fn shorten_label(label: &str, separator: &str, max_len: usize) -> String {
    let head = label.split(separator).next().unwrap_or(label).trim();
    if head.chars().count() <= max_len {
        return head.to_owned();
    }
    let keep = max_len.saturating_sub(3);
    let mut short = head.chars().take(keep).collect::<String>();
    short.push_str("...");
    short
}

pub fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// `listen_notify_unique` becomes `Listen Notify Unique`.
pub fn title_case(name: &str) -> String {
    name.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Zero connections cannot sit on a log axis, they are drawn at 0.1.
pub fn log_scale_position(connections: f64) -> f64 {
    if connections <= 0.0 { 0.1 } else { connections }
}
