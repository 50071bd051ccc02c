//! Token batches: the unit of work handed to a conversion worker.

use std::sync::Arc;

use crate::lexer::Token;

/// An immutable run of tokens submitted for one backend call.
///
/// The first `overlap` tokens repeat the tail of the previous batch and only
/// give the backend context; their audio is trimmed before emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBatch {
    seq: u64,
    tokens: Arc<[Token]>,
    overlap: usize,
}

impl TokenBatch {
    pub(crate) fn new(seq: u64, tokens: Vec<Token>, overlap: usize) -> Self {
        debug_assert!(overlap <= tokens.len());
        Self {
            seq,
            tokens: tokens.into(),
            overlap,
        }
    }

    /// Submission sequence number, starting at 0 for a session.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub(crate) fn shared_tokens(&self) -> Arc<[Token]> {
        Arc::clone(&self.tokens)
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Tokens that have not been converted by an earlier batch.
    pub fn new_tokens(&self) -> &[Token] {
        &self.tokens[self.overlap..]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
