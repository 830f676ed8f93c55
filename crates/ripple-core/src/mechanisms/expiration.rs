//! Expiration policies: which received pieces are dropped.
//!
//! Expiration runs after the user's selection has been moved to
//! `propagated` and before this iteration's deliveries are merged, so it
//! only judges records the user already held when the iteration began.

use std::collections::BTreeSet;

use ripple_types::InfoId;
use serde::Deserialize;

use crate::mechanisms::IterationContext;
use crate::protocol::ProtocolError;
use crate::state::UserState;

/// Rule deciding which `received` entries move to `discarded`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpirationMechanism {
    /// Every received piece gets exactly one chance to be forwarded.
    AllNotPropagated,
    /// Keep a received piece only while the user's ground-truth re-share
    /// of it is still ahead of (or at) the current timestamp.
    AllNotRealPropagatedTimestamp,
    /// Received pieces never expire.
    Never,
    /// Drop records that are at least `iterations` iterations old.
    MaxAge {
        /// Age at which a record expires.
        iterations: u64,
    },
}

impl ExpirationMechanism {
    /// Reject unusable parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMaxAge`] for a zero maximum age.
    pub const fn validate(&self) -> Result<(), ProtocolError> {
        if let Self::MaxAge { iterations: 0 } = self {
            return Err(ProtocolError::InvalidMaxAge);
        }
        Ok(())
    }

    /// IDs of the received pieces that expire this iteration.
    pub fn expire(&self, user: &UserState, ctx: &IterationContext<'_>) -> BTreeSet<InfoId> {
        match self {
            Self::AllNotPropagated => user.received().keys().copied().collect(),
            Self::AllNotRealPropagatedTimestamp => user
                .received()
                .keys()
                .copied()
                .filter(|id| {
                    let pending = ctx
                        .data
                        .real_propagation(user.user(), *id)
                        .zip(ctx.timestamp)
                        .is_some_and(|(real, now)| real >= now);
                    !pending
                })
                .collect(),
            Self::Never => BTreeSet::new(),
            Self::MaxAge { iterations } => user
                .received()
                .values()
                .filter(|r| ctx.iteration.saturating_sub(r.iteration) >= *iterations)
                .map(|r| r.info_id)
                .collect(),
        }
    }
}
