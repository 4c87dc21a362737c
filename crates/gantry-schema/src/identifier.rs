//! Logical identifier derivation.
//!
//! Every resource key in the compiled graph is derived from a human-given
//! name through this one function, so cross-references between resources
//! always line up.

/// Reduce a name to its logical identifier: strip every character outside
/// the ASCII alphanumeric set, then uppercase the first remaining character.
///
/// Pure and total; an empty input (or one with no alphanumeric characters)
/// yields an empty string, which normalization rejects before it can reach
/// the compiler. Distinct names that reduce to the same identifier are a
/// configuration error, not a silent merge.
pub fn identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars().filter(char::is_ascii_alphanumeric) {
        if out.is_empty() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}
