// SPDX-License-Identifier: BUSL-1.1
//! # Jobs
//!
//! A job is created by the posting flow and moved to `in_progress` when a
//! contractor's bid is accepted. This crate only moves it between
//! `in_progress`, `on_hold`, and the terminal outcomes of a dispute.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use hearth_core::{Amount, JobId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DisputeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Open,
    InProgress,
    /// Frozen by an active dispute.
    OnHold,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DisputeError::Validation(format!("unknown job status {other:?}"))),
        }
    }
}

/// Which side of the job a party is on.
///
/// The marketplace calls requesters homeowners and providers contractors;
/// those are the wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyRole {
    #[serde(rename = "homeowner")]
    Requester,
    #[serde(rename = "contractor")]
    Provider,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "homeowner",
            Self::Provider => "contractor",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Requester => Self::Provider,
            Self::Provider => Self::Requester,
        }
    }
}

impl std::fmt::Display for PartyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = DisputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "homeowner" | "requester" => Ok(Self::Requester),
            "contractor" | "provider" => Ok(Self::Provider),
            other => Err(DisputeError::Validation(format!(
                "invalid user type {other:?}: expected homeowner or contractor"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub requester_id: UserId,
    /// Contractor whose bid was accepted.
    pub provider_id: Option<UserId>,
    pub final_cost: Option<Amount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// The user holding `role` on this job, if any.
    pub fn party(&self, role: PartyRole) -> Option<UserId> {
        match role {
            PartyRole::Requester => Some(self.requester_id),
            PartyRole::Provider => self.provider_id,
        }
    }

    /// The role `user` holds on this job, if any.
    pub fn role_of(&self, user: &UserId) -> Option<PartyRole> {
        if *user == self.requester_id {
            Some(PartyRole::Requester)
        } else if self.provider_id.as_ref() == Some(user) {
            Some(PartyRole::Provider)
        } else {
            None
        }
    }

    /// Every party currently attached to the job.
    pub fn parties(&self) -> Vec<UserId> {
        let mut parties = vec![self.requester_id];
        parties.extend(self.provider_id);
        parties
    }
}
