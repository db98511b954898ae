// src/features/tokenizer.rs

/// Splits text on single spaces.
///
/// Repeated spaces are not collapsed, so `"a  b"` yields an empty token
/// between `a` and `b`. Empty tokens count toward coverage totals like any
/// other unresolvable token. Case and punctuation are left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tokenizer;

impl Tokenizer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.split(' ').collect()
    }
}
