use crate::core::domain::auth::UserRecord;
use crate::core::ports::auth::UserDirectoryPort;
use crate::utils::error::NotifierResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-memory user directory.
///
/// This adapter implements the `UserDirectoryPort` trait using a thread-safe
/// `HashMap` wrapped in an asynchronous RwLock. In production the port is
/// backed by the CRM's user store; this implementation serves tests and local
/// runs, and is seeded through `upsert`.
#[derive(Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user record.
    pub async fn upsert(&self, user: UserRecord) {
        let mut users = self.users.write().await;
        users.insert(user.user_id.clone(), user);
    }
}

#[async_trait]
impl UserDirectoryPort for MemoryUserDirectory {
    async fn lookup(&self, user_id: &str) -> NotifierResult<Option<UserRecord>> {
        let users = self.users.read().await;
        Ok(users.get(user_id).cloned())
    }
}
