//! Read-receipt reclamation protocol.
//!
//! Marks messages read by the acknowledging user and deletes every message
//! whose read-by set now covers its chatroom's full member set. The whole
//! decision runs inside one store transaction: the delete choice is a
//! read-then-compare over read-by and membership state that concurrent
//! acknowledgments would otherwise race. Transient conflicts retry the
//! transaction with exponential backoff; a bounded attempt count turns
//! exhaustion into `ReclamationConflict`.

use crate::config::RetryPolicy;
use crate::error::{AppError, AppResult};
use crate::store::{DocumentStore, StoreError};
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclamationOutcome {
    /// Reads recorded; `deleted` lists the messages reclaimed because every
    /// member has now acknowledged them.
    Acknowledged {
        acknowledged: Vec<Uuid>,
        deleted: Vec<Uuid>,
    },
    /// None of the given messages were unread by this user. A no-op, kept
    /// distinguishable from the success case.
    NothingToAcknowledge,
}

/// Run the full protocol for one acknowledgment call.
pub async fn acknowledge(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    reader: Uuid,
    raw_ids: &[String],
) -> AppResult<ReclamationOutcome> {
    // Step 1: parse everything before any transaction opens; one bad id
    // rejects the whole call.
    let ids = raw_ids
        .iter()
        .map(|raw| Uuid::parse_str(raw).map_err(|_| AppError::InvalidIdentifier(raw.clone())))
        .collect::<AppResult<Vec<Uuid>>>()?;

    if ids.is_empty() {
        return Err(AppError::MissingParameter("messageIds"));
    }

    for attempt in 0..policy.max_attempts {
        match attempt_acknowledge(store, reader, &ids).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_transient() => {
                let delay = backoff_delay(policy.base_delay, attempt);
                tracing::debug!(
                    %reader,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient conflict during read acknowledgment, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(%reader, attempts = policy.max_attempts, "read acknowledgment retry budget exhausted");
    Err(AppError::ReclamationConflict)
}

/// One transactional attempt: steps 2 through 6.
async fn attempt_acknowledge(
    store: &dyn DocumentStore,
    reader: Uuid,
    ids: &[Uuid],
) -> Result<ReclamationOutcome, StoreError> {
    let mut tx = store.begin().await?;

    // Step 2: only messages this user has not yet read.
    let unread = tx.unread_messages(ids, reader).await?;
    if unread.is_empty() {
        return Ok(ReclamationOutcome::NothingToAcknowledge);
    }
    let unread_ids: Vec<Uuid> = unread.iter().map(|m| m.id).collect();

    // Step 3: one multi-document, idempotent update.
    tx.add_reader(&unread_ids, reader).await?;

    // Step 4: compare against the membership read under this transaction,
    // not a snapshot from before it opened.
    let mut to_delete = Vec::new();
    for message in &unread {
        match tx.chatroom_members(message.chatroom).await? {
            Some(members) => {
                let members: BTreeSet<Uuid> = members.into_iter().collect();
                let mut covered = message.read_by.clone();
                covered.insert(reader);
                if covered.is_superset(&members) {
                    to_delete.push(message.id);
                }
            }
            // Chatroom deleted concurrently; the cascade would have taken
            // the message with it.
            None => to_delete.push(message.id),
        }
    }

    // Step 5: batched delete.
    if !to_delete.is_empty() {
        tx.delete_messages(&to_delete).await?;
    }

    // Step 6.
    tx.commit().await?;

    Ok(ReclamationOutcome::Acknowledged {
        acknowledged: unread_ids,
        deleted: to_delete,
    })
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1 << attempt.min(16));
    let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64);
    exp + Duration::from_millis(jitter_ms)
}
