// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token count approximation.

/// Approximates the token count of `text` as `ceil(chars / 4)`.
///
/// This is a deliberate approximation (roughly accurate for English prose,
/// increasingly wrong for code and CJK text). Every budget computation in the
/// workspace goes through this one function so a real tokenizer can be swapped
/// in at a single point.
pub fn approx_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(approx_token_count(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(approx_token_count("a"), 1);
        assert_eq!(approx_token_count("abcd"), 1);
        assert_eq!(approx_token_count("abcde"), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // Four multibyte chars is still one approximate token.
        assert_eq!(approx_token_count("éééé"), 1);
    }
}
