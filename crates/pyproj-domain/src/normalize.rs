/// Canonical distribution name: lowercase with runs of `-`, `_` and `.`
/// collapsed into a single `-`.
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending = false;
    for ch in name.trim().chars() {
        if matches!(ch, '-' | '_' | '.') {
            pending = true;
            continue;
        }
        if pending && !out.is_empty() {
            out.push('-');
        }
        pending = false;
        out.push(ch.to_ascii_lowercase());
    }
    out
}

/// Whether two spellings refer to the same distribution.
pub fn names_match(left: &str, right: &str) -> bool {
    canonicalize_name(left) == canonicalize_name(right)
}
