//! Filesystem-safe names for remote documents.

/// Turn an arbitrary document name into a lower-case slug.
///
/// Every character that is not an ASCII letter or digit becomes `_`, runs of
/// `_` collapse to one, and the result is lower-cased. Separators left at
/// either end are dropped, so `"Hello, World!!"` does not end in `_`.
///
/// ```rust
/// use fce_bridge::normalize::normalize_name;
///
/// assert_eq!(normalize_name("Hello, World!!"), "hello_world");
/// assert_eq!(normalize_name(""), "");
/// ```
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
