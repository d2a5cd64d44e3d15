//! Reserved code points for punctuation that must survive repeated passes.
//!
//! The scanner treats `{`, `}`, `(`, `)`, `<`, `>`, `:` and `;` as potential
//! syntax. Text that has to reach the reader as a literal is stored as one of
//! the private-use code points below and restored by [`decode_all`] once every
//! pass is done.

const ESCAPE_TABLE: [(char, char); 8] = [
    ('{', '\u{E9B8}'),
    ('}', '\u{E9B9}'),
    ('(', '\u{E9BA}'),
    (')', '\u{E9BB}'),
    ('<', '\u{E9BC}'),
    ('>', '\u{E9BD}'),
    (':', '\u{E9BE}'),
    (';', '\u{E9BF}'),
];

/// Returns the reserved code point for `c`, if `c` is one of the escapable characters.
pub fn encode_char(c: char) -> Option<char> {
    ESCAPE_TABLE
        .iter()
        .find(|(literal, _)| *literal == c)
        .map(|(_, code)| *code)
}

/// Returns the literal character behind a reserved code point.
pub fn decode_char(c: char) -> Option<char> {
    ESCAPE_TABLE
        .iter()
        .find(|(_, code)| *code == c)
        .map(|(literal, _)| *literal)
}

/// Encodes a single character. Characters outside the table are returned as-is.
pub fn encode_literal(c: char) -> String {
    encode_char(c).unwrap_or(c).to_string()
}

/// Encodes every escapable character in `text`, braces included.
pub fn encode_all(text: &str) -> String {
    text.chars().map(|c| encode_char(c).unwrap_or(c)).collect()
}

/// Restores every reserved code point in `text`. Total and idempotent.
pub fn decode_all(text: &str) -> String {
    text.chars().map(|c| decode_char(c).unwrap_or(c)).collect()
}
