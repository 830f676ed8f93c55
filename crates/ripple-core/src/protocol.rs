//! The five-policy bundle driving a simulation.
//!
//! A [`Protocol`] binds one policy of each family. It carries no behavior
//! of its own; building one validates every policy so that configuration
//! mistakes surface before the first iteration.

use crate::catalog::ProtocolName;
use crate::mechanisms::{
    ExpirationMechanism, PropagationMechanism, SelectionMechanism, SightMechanism,
    UpdateMechanism,
};

/// Errors raised while assembling a protocol.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    /// A count was negative or does not fit in 32 bits.
    #[error("invalid count {value}: expected `all` or a non-negative integer")]
    InvalidCount {
        /// The rejected value.
        value: i64,
    },

    /// A threshold rule would fire without any informing neighbor.
    #[error("invalid threshold {threshold}: must be at least 1")]
    InvalidThreshold {
        /// The rejected value.
        threshold: u32,
    },

    /// A probability fell outside `[0, 1]`.
    #[error("invalid {name} {value}: must be within [0, 1]")]
    InvalidProbability {
        /// Which probability.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A maximum age of zero would expire pieces on arrival.
    #[error("invalid max age: must be at least 1 iteration")]
    InvalidMaxAge,

    /// A preconfigured protocol needs a parameter that was not given.
    #[error("protocol {protocol} requires parameter `{parameter}`")]
    MissingParameter {
        /// The protocol being built.
        protocol: ProtocolName,
        /// The missing parameter.
        parameter: &'static str,
    },

    /// No preconfigured protocol has this name.
    #[error("unknown protocol `{name}`")]
    UnknownProtocol {
        /// The name looked up.
        name: String,
    },
}

/// Reject `value` unless it is a probability.
pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<(), ProtocolError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidProbability { name, value })
    }
}

/// One policy of each family.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    selection: SelectionMechanism,
    expiration: ExpirationMechanism,
    update: UpdateMechanism,
    propagation: PropagationMechanism,
    sight: SightMechanism,
}

impl Protocol {
    /// Bundle and validate five policies.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProtocolError`] reported by a policy.
    pub fn new(
        selection: SelectionMechanism,
        expiration: ExpirationMechanism,
        update: UpdateMechanism,
        propagation: PropagationMechanism,
        sight: SightMechanism,
    ) -> Result<Self, ProtocolError> {
        selection.validate()?;
        expiration.validate()?;
        sight.validate()?;
        Ok(Self {
            selection,
            expiration,
            update,
            propagation,
            sight,
        })
    }

    /// The selection policy.
    pub const fn selection(&self) -> &SelectionMechanism {
        &self.selection
    }

    /// The expiration policy.
    pub const fn expiration(&self) -> &ExpirationMechanism {
        &self.expiration
    }

    /// The update policy.
    pub const fn update(&self) -> &UpdateMechanism {
        &self.update
    }

    /// The propagation policy.
    pub const fn propagation(&self) -> &PropagationMechanism {
        &self.propagation
    }

    /// The sight policy.
    pub const fn sight(&self) -> &SightMechanism {
        &self.sight
    }
}
