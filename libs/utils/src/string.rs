/// Trims surrounding whitespace and lower-cases the input.
///
/// Two user inputs that differ only in case or padding normalize to the same value.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}

/// Returns at most the last `max_chars` characters of `input`, cut on a char boundary.
pub fn tail(input: &str, max_chars: usize) -> &str {
    let count = input.chars().count();
    if count <= max_chars {
        return input;
    }

    match input.char_indices().nth(count - max_chars) {
        Some((idx, _)) => &input[idx..],
        None => input,
    }
}
