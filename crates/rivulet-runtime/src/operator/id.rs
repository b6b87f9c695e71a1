//! Operator identifier type.

use derive_more::{Debug, Display, From, Into};

/// Identifier of an operator within its [`OperatorTree`](super::OperatorTree).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Debug, Display, From, Into)]
#[debug("#{_0}")]
#[display("#{_0}")]
pub struct OperatorId(usize);

impl OperatorId {
    /// Returns the arena index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}
