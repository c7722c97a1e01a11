/// Masking for secrets that show up in log lines

/// Shorten a secret to something safe to log.
///
/// Values longer than 16 characters keep their first 6 and last 4
/// characters; anything shorter is replaced entirely.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 16 {
        return "***".to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
