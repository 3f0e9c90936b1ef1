//! PO number token lists.
//!
//! A request's `po_numbers` column is free text. Tokens are separated by any
//! run of whitespace and/or commas; the list behaves as an ordered set.

use crate::errors::BoardError;

const SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoTokens(Vec<String>);

/// Result of splitting a request's tokens by a fulfillment selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fulfillment {
    /// The selection covers every outstanding token.
    Full,
    Partial {
        selected: PoTokens,
        remaining: PoTokens,
    },
}

impl PoTokens {
    pub fn parse(raw: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for piece in raw.split(|c: char| c == ',' || c.is_whitespace()) {
            if piece.is_empty() || tokens.iter().any(|t| t == piece) {
                continue;
            }
            tokens.push(piece.to_string());
        }
        Self(tokens)
    }

    pub fn join(&self) -> String {
        self.0.join(SEPARATOR)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Split these tokens by `selection`.
    ///
    /// The selection must be non-empty and drawn from these tokens. Both
    /// halves of a partial split keep the original token order.
    pub fn fulfill<S: AsRef<str>>(&self, selection: &[S]) -> Result<Fulfillment, BoardError> {
        let wanted = PoTokens::parse(
            &selection
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(" "),
        );
        if wanted.is_empty() {
            return Err(BoardError::EmptySelection);
        }

        let unknown: Vec<String> = wanted
            .iter()
            .filter(|t| !self.contains(t))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            return Err(BoardError::UnknownTokens { tokens: unknown });
        }

        if wanted.len() == self.len() {
            return Ok(Fulfillment::Full);
        }

        let (selected, remaining): (Vec<String>, Vec<String>) =
            self.0.iter().cloned().partition(|t| wanted.contains(t));
        Ok(Fulfillment::Partial {
            selected: PoTokens(selected),
            remaining: PoTokens(remaining),
        })
    }
}

impl<'a> IntoIterator for &'a PoTokens {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
