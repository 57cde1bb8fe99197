use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::message::Message;

/// Unbounded FIFO of messages shared between a transport's receive path and
/// the agent scheduler.
///
/// Every operation takes the lock for its whole duration, so a push that
/// completes before a pop is always visible to that pop, and `len`/`is_empty`
/// never observe a half-applied update.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<Message>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back.
    pub fn push(&self, message: Message) {
        self.inner.lock().push_back(message);
    }

    /// Put a message back at the front so it is the next one popped.
    pub fn push_front(&self, message: Message) {
        self.inner.lock().push_front(message);
    }

    /// Pop the oldest message.
    pub fn pop(&self) -> Option<Message> {
        self.inner.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().iter().cloned().collect()
    }
}
