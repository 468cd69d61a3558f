// SPDX-License-Identifier: BUSL-1.1
//! # Identity Newtypes
//!
//! UUID-backed identifiers for every record the escrow core touches. Each is
//! a distinct type, always valid by construction, and serializes as the bare
//! UUID string so wire and database representations stay unchanged.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidIdentifier {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_identifier!(
    /// A unit of requested work posted by a homeowner.
    JobId,
    "job"
);

uuid_identifier!(
    /// A dispute filed against an in-progress job.
    DisputeId,
    "dispute"
);

uuid_identifier!(
    /// The escrow hold securing one job's payment.
    PaymentHoldId,
    "payment hold"
);

uuid_identifier!(
    /// A marketplace user: homeowner, contractor or administrator.
    UserId,
    "user"
);

uuid_identifier!(
    /// One intended transfer or refund recorded before the processor call.
    SettlementId,
    "settlement"
);
