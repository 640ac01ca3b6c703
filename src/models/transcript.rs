use std::sync::{Arc, Mutex, MutexGuard};

use super::message::Message;

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    // Bumped whenever the list is swapped out for another conversation.
    generation: u64,
}

/// The working message list of the conversation currently on screen.
///
/// Cheap to clone; clones share the same list. The lock is never held across
/// an `.await`.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    inner: Arc<Mutex<Inner>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock can only come from a push; the list
        // itself is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, message: Message) -> usize {
        let mut inner = self.lock();
        inner.messages.push(message);
        inner.messages.len()
    }

    /// Identifies the conversation currently held. Changes on `replace` and
    /// `clear`, not on `push`.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Append only if the list still belongs to `generation`. Returns the new
    /// message list when appended.
    pub fn push_if_current(&self, generation: u64, message: Message) -> Option<Vec<Message>> {
        let mut inner = self.lock();
        if inner.generation != generation {
            return None;
        }
        inner.messages.push(message);
        Some(inner.messages.clone())
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().messages.clone()
    }

    pub fn replace(&self, messages: Vec<Message>) {
        let mut inner = self.lock();
        inner.messages = messages;
        inner.generation += 1;
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.messages.clear();
        inner.generation += 1;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().messages.is_empty()
    }
}
