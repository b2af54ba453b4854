use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[A-Za-z0-9]+").expect("valid regex");
}

/// Splits text into lowercased ASCII-alphanumeric runs, preserving order
/// and duplicates.
///
/// This is the single tokenization rule shared by the lexical index, the
/// hashing embedder, and snippet matching; identical text always yields
/// the identical token sequence.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|token| token.as_str().to_ascii_lowercase())
        .collect()
}
