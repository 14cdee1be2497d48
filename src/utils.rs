/// Rough estimate: one GPT-style token per ~4 chars. Close enough for the
/// status line and the final summary.
pub fn approx_tokens(s: &str) -> usize {
    s.chars().count() / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_with_length() {
        assert_eq!(approx_tokens(""), 0);
        assert_eq!(approx_tokens("abcd"), 1);
        assert_eq!(approx_tokens(&"x".repeat(400)), 100);
    }
}
