//! # Gateway KV Store
//!
//! Chat history and per-user settings persistence (§6). A real deployment
//! backs these with a document database; this crate ships a `DashMap`-backed
//! in-process stand-in behind the same traits, matching the teacher's
//! per-user `DashMap` idiom already used for rate limiting state.

use crate::record::ChatTurn;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, session_id: &str, turn: ChatTurn);
    async fn list(&self, session_id: &str) -> Vec<ChatTurn>;
    async fn recent(&self, session_id: &str, n: usize) -> Vec<ChatTurn>;
    async fn clear(&self, session_id: &str) -> usize;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserSettings {
    pub enabled_services: Vec<String>,
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn upsert(&self, user_id: &str, settings: UserSettings);
    async fn get(&self, user_id: &str) -> Option<UserSettings>;
}

#[derive(Debug, Default)]
pub struct InProcessHistoryStore {
    sessions: DashMap<String, Vec<ChatTurn>>,
}

impl InProcessHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InProcessHistoryStore {
    async fn append(&self, session_id: &str, turn: ChatTurn) {
        self.sessions.entry(session_id.to_string()).or_default().push(turn);
    }

    async fn list(&self, session_id: &str) -> Vec<ChatTurn> {
        self.sessions.get(session_id).map(|turns| turns.clone()).unwrap_or_default()
    }

    async fn recent(&self, session_id: &str, n: usize) -> Vec<ChatTurn> {
        let turns = self.list(session_id).await;
        let start = turns.len().saturating_sub(n);
        turns[start..].to_vec()
    }

    async fn clear(&self, session_id: &str) -> usize {
        self.sessions.remove(session_id).map(|(_, turns)| turns.len()).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct InProcessSettingsStore {
    users: DashMap<String, UserSettings>,
}

impl InProcessSettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InProcessSettingsStore {
    async fn upsert(&self, user_id: &str, settings: UserSettings) {
        self.users.insert(user_id.to_string(), settings);
    }

    async fn get(&self, user_id: &str) -> Option<UserSettings> {
        self.users.get(user_id).map(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceKind;

    fn turn(n: u64) -> ChatTurn {
        ChatTurn {
            session_id: "s1".to_string(),
            user_message: format!("message {}", n),
            bot_response: format!("response {}", n),
            sources: vec![SourceKind::Wiki],
            timestamp: n,
        }
    }

    #[tokio::test]
    async fn recent_returns_last_n_in_order() {
        let store = InProcessHistoryStore::new();
        for i in 0..10 {
            store.append("s1", turn(i)).await;
        }
        let recent = store.recent("s1", 3).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].timestamp, 7);
        assert_eq!(recent[2].timestamp, 9);
    }

    #[tokio::test]
    async fn clear_returns_deleted_count() {
        let store = InProcessHistoryStore::new();
        store.append("s1", turn(0)).await;
        store.append("s1", turn(1)).await;
        assert_eq!(store.clear("s1").await, 2);
        assert!(store.list("s1").await.is_empty());
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let store = InProcessSettingsStore::new();
        assert!(store.get("u1").await.is_none());
        store
            .upsert(
                "u1",
                UserSettings { enabled_services: vec!["jira".to_string()], extra: Default::default() },
            )
            .await;
        let settings = store.get("u1").await.unwrap();
        assert_eq!(settings.enabled_services, vec!["jira".to_string()]);
    }
}
