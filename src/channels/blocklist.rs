//! Blocked senders. Messages from a blocked number are dropped before intake.

use std::collections::HashSet;

use tokio::sync::RwLock;

/// Set of blocked sender ids, shared between the message loop and the admin API.
#[derive(Debug, Default)]
pub struct Blocklist {
    numbers: RwLock<HashSet<String>>,
}

impl Blocklist {
    pub fn new<I, S>(initial: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            numbers: RwLock::new(initial.into_iter().map(Into::into).collect()),
        }
    }

    /// Block a sender. Returns false if it was already blocked.
    pub async fn add(&self, number: &str) -> bool {
        self.numbers.write().await.insert(number.to_string())
    }

    /// Unblock a sender. Returns false if it wasn't blocked.
    pub async fn remove(&self, number: &str) -> bool {
        self.numbers.write().await.remove(number)
    }

    pub async fn contains(&self, number: &str) -> bool {
        self.numbers.read().await.contains(number)
    }

    pub async fn len(&self) -> usize {
        self.numbers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.numbers.read().await.is_empty()
    }
}
