// SPDX-License-Identifier: BUSL-1.1
//! Detached dispatch of dispute notices.
//!
//! Notices are sent on spawned tasks after the state commit. Delivery
//! failures are logged here and go no further.

use std::sync::Arc;

use hearth_gateway::{DisputeFiledNotice, DisputeResolvedNotice, Notifier};
use tokio::task::JoinHandle;

pub(crate) fn spawn_filed(notifier: Arc<dyn Notifier>, notice: DisputeFiledNotice) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_dispute_filed(&notice).await {
            tracing::warn!(
                notifier = notifier.notifier_name(),
                dispute_id = %notice.dispute_id,
                recipient = %notice.recipient,
                error = %e,
                "dispute filed notice not delivered"
            );
        }
    })
}

pub(crate) fn spawn_resolved(notifier: Arc<dyn Notifier>, notices: Vec<DisputeResolvedNotice>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for notice in notices {
            if let Err(e) = notifier.notify_dispute_resolved(&notice).await {
                tracing::warn!(
                    notifier = notifier.notifier_name(),
                    dispute_id = %notice.dispute_id,
                    recipient = %notice.recipient,
                    error = %e,
                    "dispute resolved notice not delivered"
                );
            }
        }
    })
}
