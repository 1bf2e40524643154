//! Document store boundary.
//!
//! The relay treats its backing store as an ACID-transactional document
//! store. Components receive a store handle at construction; nothing in the
//! crate reaches for a global connection. The only multi-statement
//! transaction in the system is the read-receipt reclamation protocol, which
//! drives the `StoreTransaction` interface below.

use crate::models::{Chatroom, Message, User};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A transaction could not complete because of concurrent contention.
    /// Retrying the whole transaction may succeed.
    #[error("transient transaction conflict")]
    Conflict,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_chatroom(&self, id: Uuid) -> Result<Option<Chatroom>, StoreError>;

    /// Lookup by the canonical (sorted, deduplicated) member set.
    async fn find_chatroom_by_members(&self, members: &[Uuid])
        -> Result<Option<Chatroom>, StoreError>;

    /// Insert a chatroom with `first_message_sent = false`. `members` must
    /// already be canonical.
    async fn insert_chatroom(&self, members: Vec<Uuid>) -> Result<Chatroom, StoreError>;

    /// Add a member. Returns `false` when the user was already a member.
    async fn add_chatroom_member(&self, id: Uuid, user: Uuid) -> Result<bool, StoreError>;

    /// Delete a chatroom and cascade-delete all of its messages. Returns
    /// `false` when no such chatroom existed.
    async fn delete_chatroom(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn insert_message(&self, message: Message) -> Result<(), StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: User) -> Result<(), StoreError>;

    /// Conditionally flip the chatroom's `first_message_sent` flag. Returns
    /// `true` only for the caller that performed the flip, so exactly one of
    /// two racing first senders wins.
    async fn claim_first_message(&self, chatroom: Uuid) -> Result<bool, StoreError>;

    /// Open a multi-statement transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

/// A multi-statement transaction.
///
/// Reads record what the transaction depends on; writes are buffered until
/// `commit`. A commit fails with [`StoreError::Conflict`] when a concurrent
/// committer touched any document this transaction read.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Fetch the messages among `ids` whose read-by set does not yet contain
    /// `reader`.
    async fn unread_messages(
        &mut self,
        ids: &[Uuid],
        reader: Uuid,
    ) -> Result<Vec<Message>, StoreError>;

    /// Buffer `reader` into the read-by set of every message in `ids`.
    /// Idempotent: adding an already-present reader is a no-op.
    async fn add_reader(&mut self, ids: &[Uuid], reader: Uuid) -> Result<(), StoreError>;

    /// Current member set of a chatroom, read under this transaction.
    async fn chatroom_members(&mut self, id: Uuid) -> Result<Option<Vec<Uuid>>, StoreError>;

    /// Buffer a batched delete.
    async fn delete_messages(&mut self, ids: &[Uuid]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
