/// Normalizes one line of the URL source; blank lines yield `None`.
pub fn parse_url_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Splits a line-delimited URL list, trimming each entry and skipping blanks.
pub fn parse_url_lines(raw: &str) -> Vec<String> {
    raw.lines().filter_map(parse_url_line).collect()
}
