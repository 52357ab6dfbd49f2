// Streambot Path Validation Service
// Keeps externally supplied identifiers from escaping their directory

/// Sanitize an identifier for use as a file stem.
/// Anything outside `[A-Za-z0-9_-]` becomes `_`, so separators and `..`
/// can never reach the filesystem.
///
/// # Returns
/// * The sanitized stem; empty when the input was blank
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Whether a name can be used as a file stem exactly as given.
/// Blank names and anything `sanitize_filename` would rewrite are refused, so
/// distinct names always map to distinct files.
pub fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty() && sanitize_filename(name) == name
}
