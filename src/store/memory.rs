//! In-memory document store with optimistic transactions.
//!
//! Documents carry version counters. A transaction records the version of
//! every document it reads, buffers its writes, and validates the recorded
//! versions under the store lock at commit; any interleaving commit that
//! touched a read document fails the validation with
//! [`StoreError::Conflict`], which callers treat as transient and retry.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::{DocumentStore, StoreError, StoreTransaction};
use crate::models::{Chatroom, Message, User};

#[derive(Clone)]
struct Versioned<T> {
    doc: T,
    version: u64,
}

#[derive(Default)]
struct Inner {
    chatrooms: HashMap<Uuid, Versioned<Chatroom>>,
    messages: HashMap<Uuid, Versioned<Message>>,
    users: HashMap<Uuid, User>,
    /// Test hook: number of upcoming commits forced to fail with `Conflict`.
    injected_conflicts: u32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Force the next `n` transaction commits to fail with a transient
    /// conflict. Used by tests to exercise the retry path.
    pub fn inject_commit_conflicts(&self, n: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.injected_conflicts = n;
        }
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().map(|i| i.messages.len()).unwrap_or(0)
    }

    pub fn find_message_sync(&self, id: Uuid) -> Option<Message> {
        self.inner
            .lock()
            .ok()
            .and_then(|i| i.messages.get(&id).map(|v| v.doc.clone()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_chatroom(&self, id: Uuid) -> Result<Option<Chatroom>, StoreError> {
        Ok(self.lock()?.chatrooms.get(&id).map(|v| v.doc.clone()))
    }

    async fn find_chatroom_by_members(
        &self,
        members: &[Uuid],
    ) -> Result<Option<Chatroom>, StoreError> {
        Ok(self
            .lock()?
            .chatrooms
            .values()
            .find(|v| v.doc.members == members)
            .map(|v| v.doc.clone()))
    }

    async fn insert_chatroom(&self, members: Vec<Uuid>) -> Result<Chatroom, StoreError> {
        let chatroom = Chatroom {
            id: Uuid::new_v4(),
            members,
            first_message_sent: false,
        };
        self.lock()?.chatrooms.insert(
            chatroom.id,
            Versioned {
                doc: chatroom.clone(),
                version: 0,
            },
        );
        Ok(chatroom)
    }

    async fn add_chatroom_member(&self, id: Uuid, user: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let entry = inner
            .chatrooms
            .get_mut(&id)
            .ok_or_else(|| StoreError::Unavailable("chatroom vanished".into()))?;
        if entry.doc.has_member(user) {
            return Ok(false);
        }
        let idx = entry.doc.members.partition_point(|m| *m < user);
        entry.doc.members.insert(idx, user);
        entry.version += 1;
        Ok(true)
    }

    async fn delete_chatroom(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.chatrooms.remove(&id).is_none() {
            return Ok(false);
        }
        inner.messages.retain(|_, v| v.doc.chatroom != id);
        Ok(true)
    }

    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        self.lock()?.messages.insert(
            message.id,
            Versioned {
                doc: message,
                version: 0,
            },
        );
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.lock()?.users.insert(user.id, user);
        Ok(())
    }

    async fn claim_first_message(&self, chatroom: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.chatrooms.get_mut(&chatroom) {
            Some(entry) if !entry.doc.first_message_sent => {
                entry.doc.first_message_sent = true;
                entry.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            read_versions: HashMap::new(),
            pending_readers: Vec::new(),
            pending_deletes: BTreeSet::new(),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DocKey {
    Chatroom(Uuid),
    Message(Uuid),
}

struct MemoryTransaction {
    store: MemoryStore,
    /// Version of every document this transaction read, validated at commit.
    read_versions: HashMap<DocKey, u64>,
    pending_readers: Vec<(Uuid, Uuid)>, // (message id, reader)
    pending_deletes: BTreeSet<Uuid>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn unread_messages(
        &mut self,
        ids: &[Uuid],
        reader: Uuid,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.store.lock()?;
        let mut out = Vec::new();
        for id in ids {
            if let Some(entry) = inner.messages.get(id) {
                if !entry.doc.read_by.contains(&reader) {
                    self.read_versions
                        .insert(DocKey::Message(*id), entry.version);
                    out.push(entry.doc.clone());
                }
            }
        }
        Ok(out)
    }

    async fn add_reader(&mut self, ids: &[Uuid], reader: Uuid) -> Result<(), StoreError> {
        for id in ids {
            self.pending_readers.push((*id, reader));
        }
        Ok(())
    }

    async fn chatroom_members(&mut self, id: Uuid) -> Result<Option<Vec<Uuid>>, StoreError> {
        let inner = self.store.lock()?;
        match inner.chatrooms.get(&id) {
            Some(entry) => {
                self.read_versions
                    .insert(DocKey::Chatroom(id), entry.version);
                Ok(Some(entry.doc.members.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_messages(&mut self, ids: &[Uuid]) -> Result<(), StoreError> {
        self.pending_deletes.extend(ids.iter().copied());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            store,
            read_versions,
            pending_readers,
            pending_deletes,
        } = *self;
        let mut inner = store.lock()?;

        if inner.injected_conflicts > 0 {
            inner.injected_conflicts -= 1;
            return Err(StoreError::Conflict);
        }

        // Validate: every document read must still exist at the version we
        // saw. A concurrent commit that bumped (or deleted) one of them
        // invalidates this transaction's read-then-decide logic.
        for (key, seen) in &read_versions {
            let current = match key {
                DocKey::Chatroom(id) => inner.chatrooms.get(id).map(|v| v.version),
                DocKey::Message(id) => inner.messages.get(id).map(|v| v.version),
            };
            if current != Some(*seen) {
                return Err(StoreError::Conflict);
            }
        }

        for (message_id, reader) in pending_readers {
            if let Some(entry) = inner.messages.get_mut(&message_id) {
                if entry.doc.read_by.insert(reader) {
                    entry.version += 1;
                }
            }
        }

        for message_id in pending_deletes {
            inner.messages.remove(&message_id);
        }

        Ok(())
    }
}
