// SPDX-License-Identifier: BUSL-1.1
//! # Authorization Gate
//!
//! The decision point consulted before filing or resolving. Policy lives
//! behind the trait so deployments can swap in a remote policy service.

use std::collections::HashSet;

use async_trait::async_trait;
use hearth_core::UserId;

use crate::job::{Job, PartyRole};

#[async_trait]
pub trait AuthorizationGate: Send + Sync {
    /// May `user` act on `job` in `role`?
    async fn can_act_on_job(&self, user: &UserId, job: &Job, role: PartyRole) -> bool;

    /// May `admin` resolve or review disputes?
    async fn can_resolve_disputes(&self, admin: &UserId) -> bool;
}

/// Default policy: a party may act only in the role they hold on the job.
/// Resolution is open to every admin unless an allow-list is configured.
#[derive(Debug, Clone, Default)]
pub struct PartyGate {
    admins: Option<HashSet<UserId>>,
}

impl PartyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict resolution to `admins`.
    pub fn with_admins(admins: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            admins: Some(admins.into_iter().collect()),
        }
    }
}

#[async_trait]
impl AuthorizationGate for PartyGate {
    async fn can_act_on_job(&self, user: &UserId, job: &Job, role: PartyRole) -> bool {
        job.party(role).as_ref() == Some(user)
    }

    async fn can_resolve_disputes(&self, admin: &UserId) -> bool {
        match &self.admins {
            None => true,
            Some(allowed) => allowed.contains(admin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;
    use chrono::Utc;
    use hearth_core::JobId;

    fn job() -> Job {
        Job {
            id: JobId::new(),
            title: "Patch drywall".into(),
            status: JobStatus::InProgress,
            requester_id: UserId::new(),
            provider_id: Some(UserId::new()),
            final_cost: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn party_must_match_claimed_role() {
        let gate = PartyGate::new();
        let job = job();
        let provider = job.provider_id.unwrap();

        assert!(gate.can_act_on_job(&job.requester_id, &job, PartyRole::Requester).await);
        assert!(gate.can_act_on_job(&provider, &job, PartyRole::Provider).await);
        // Right person, wrong role.
        assert!(!gate.can_act_on_job(&job.requester_id, &job, PartyRole::Provider).await);
        assert!(!gate.can_act_on_job(&UserId::new(), &job, PartyRole::Requester).await);
    }

    #[tokio::test]
    async fn allow_list_restricts_admins() {
        let admin = UserId::new();
        assert!(PartyGate::new().can_resolve_disputes(&UserId::new()).await);

        let gate = PartyGate::with_admins([admin]);
        assert!(gate.can_resolve_disputes(&admin).await);
        assert!(!gate.can_resolve_disputes(&UserId::new()).await);
    }
}
