use metrics::counter;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use linehook_core::{map_event, Event};
use linehook_storage::{DocumentError, DocumentRepository};

/// Errors a single event can end with.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("persistence task did not complete: {0}")]
    Task(String),
}

impl PersistError {
    fn metric_reason(&self) -> &'static str {
        match self {
            Self::Document(err) => err.kind(),
            Self::Task(_) => "task",
        }
    }
}

#[derive(Debug)]
pub enum OutcomeStatus {
    Persisted,
    Skipped,
    Failed(PersistError),
}

/// Result of handling one event of the envelope.
#[derive(Debug)]
pub struct EventOutcome {
    /// Position of the event in the envelope.
    pub index: usize,
    pub message_id: Option<String>,
    pub status: OutcomeStatus,
}

/// Outcomes of every event of one request, ordered by envelope position.
#[derive(Debug, Default)]
pub struct DispatchReport {
    outcomes: Vec<EventOutcome>,
}

impl DispatchReport {
    pub fn outcomes(&self) -> &[EventOutcome] {
        &self.outcomes
    }

    pub fn persisted_count(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|outcome| matches!(outcome.status, OutcomeStatus::Persisted))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|outcome| matches!(outcome.status, OutcomeStatus::Skipped))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EventOutcome> {
        self.outcomes()
            .iter()
            .filter(|outcome| matches!(outcome.status, OutcomeStatus::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Message ids of failed events; events without a message are listed as `#<index>`.
    pub fn failed_ids(&self) -> Vec<String> {
        self.failures()
            .map(|outcome| {
                outcome
                    .message_id
                    .clone()
                    .unwrap_or_else(|| format!("#{}", outcome.index))
            })
            .collect()
    }
}

/// Persistence task of one event, with the envelope position and message id it
/// reports under.
pub(crate) type PendingEvent = (usize, Option<String>, JoinHandle<OutcomeStatus>);

/// Maps and persists every event concurrently, one task per event, and waits
/// for all of them. No ordering is guaranteed between the writes.
pub async fn dispatch_events(
    repo: &DocumentRepository,
    events: Vec<Event>,
    request_id: Uuid,
) -> DispatchReport {
    let pending: Vec<PendingEvent> = events
        .into_iter()
        .enumerate()
        .map(|(index, event)| {
            let message_id = event.message.as_ref().map(|message| message.id.clone());
            let repo = repo.clone();
            let handle =
                tokio::spawn(async move { persist_event(&repo, &event, request_id).await });
            (index, message_id, handle)
        })
        .collect();

    collect_outcomes(pending, request_id).await
}

/// Awaits every task in envelope order. A task that panicked or was cancelled
/// counts as a failed event.
pub(crate) async fn collect_outcomes(
    pending: Vec<PendingEvent>,
    request_id: Uuid,
) -> DispatchReport {
    let mut outcomes = Vec::with_capacity(pending.len());
    for (index, message_id, handle) in pending {
        let status = match handle.await {
            Ok(status) => status,
            Err(join_err) => {
                error!(
                    stage = "dispatch",
                    %request_id,
                    index,
                    message_id = message_id.as_deref().unwrap_or(""),
                    error = %join_err,
                    "persistence task aborted"
                );
                OutcomeStatus::Failed(PersistError::Task(join_err.to_string()))
            }
        };

        if let OutcomeStatus::Failed(err) = &status {
            counter!("message_persist_failures_total", "reason" => err.metric_reason())
                .increment(1);
        }

        outcomes.push(EventOutcome {
            index,
            message_id,
            status,
        });
    }

    DispatchReport { outcomes }
}

async fn persist_event(
    repo: &DocumentRepository,
    event: &Event,
    request_id: Uuid,
) -> OutcomeStatus {
    let keyed = match map_event(event) {
        Ok(keyed) => keyed,
        Err(unmapped) => {
            info!(
                stage = "dispatch",
                %request_id,
                event_type = %event.event_type,
                message_type = unmapped.type_label(),
                reason = ?unmapped,
                "event has no record shape; skipped"
            );
            counter!("messages_skipped_total", "type" => unmapped.type_label().to_string())
                .increment(1);
            return OutcomeStatus::Skipped;
        }
    };

    let message_type = keyed.record.header.message_type.clone();
    match repo.create(&keyed.message_id, &keyed.record).await {
        Ok(ack) => {
            let occurred_at = event
                .occurred_at()
                .map(|at| at.to_rfc3339())
                .unwrap_or_default();
            info!(
                stage = "storage",
                %request_id,
                message_id = %keyed.message_id,
                message_type = %message_type,
                %occurred_at,
                update_time = %ack.update_time.to_rfc3339(),
                "message persisted"
            );
            counter!("messages_persisted_total", "type" => message_type).increment(1);
            OutcomeStatus::Persisted
        }
        Err(err) => {
            warn!(
                stage = "storage",
                %request_id,
                message_id = %keyed.message_id,
                collection = repo.collection(),
                error = %err,
                "failed to persist message"
            );
            OutcomeStatus::Failed(err.into())
        }
    }
}
