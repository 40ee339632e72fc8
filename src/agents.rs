//! Monitored-host agents and ownership resolution
//!
//! The engine only needs to know whether an agent exists and who owns it;
//! that question goes through [`AgentValidator`]. [`AgentRegistry`] is a
//! small JSON-file-backed implementation used by the command-line front end.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::store::StoreError;

/// Longest identifier accepted for agents and sessions
pub const MAX_ID_LEN: usize = 64;

/// Whether `id` is a syntactically valid agent or session identifier
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Facts an agent reported about its host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    /// Owning user
    pub user_id: String,
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub kernel_version: String,
    #[serde(default)]
    pub os_version: String,
    pub created_at: DateTime<Utc>,
}

impl AgentInfo {
    pub fn new(user_id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().simple().to_string(),
            user_id: user_id.into(),
            hostname: hostname.into(),
            ip_address: String::new(),
            kernel_version: String::new(),
            os_version: String::new(),
            created_at: Utc::now(),
        }
    }

    /// Host facts suitable for the opening oracle prompt
    pub fn system_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        for (key, value) in [
            ("Hostname", &self.hostname),
            ("IP Address", &self.ip_address),
            ("Kernel", &self.kernel_version),
            ("OS", &self.os_version),
        ] {
            if !value.is_empty() {
                info.insert(key.to_string(), value.clone());
            }
        }
        info
    }
}

/// Resolves agent identifiers to their records
#[async_trait]
pub trait AgentValidator: Send + Sync {
    /// Look up an agent, `None` if it does not exist
    async fn find_agent(&self, agent_id: &str) -> Result<Option<AgentInfo>, StoreError>;
}

/// In-memory agent directory, optionally mirrored to a JSON file
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentInfo>>,
    path: Option<PathBuf>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path` (empty if the file does not exist yet); subsequent
    /// registrations are written back to it
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let agents = match std::fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<AgentInfo> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|a| (a.id.clone(), a)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            agents: RwLock::new(agents),
            path: Some(path),
        })
    }

    /// Add or replace an agent record
    pub async fn register(&self, agent: AgentInfo) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        agents.insert(agent.id.clone(), agent);
        if let Some(path) = &self.path {
            let mut list: Vec<&AgentInfo> = agents.values().collect();
            list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_vec_pretty(&list)?).await?;
        }
        Ok(())
    }

    /// Agents owned by `user_id`, oldest first
    pub async fn agents_for_user(&self, user_id: &str) -> Vec<AgentInfo> {
        let mut list: Vec<AgentInfo> = self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }
}

#[async_trait]
impl AgentValidator for AgentRegistry {
    async fn find_agent(&self, agent_id: &str) -> Result<Option<AgentInfo>, StoreError> {
        Ok(self.agents.read().await.get(agent_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_id("a1"));
        assert!(is_valid_id("0190a5c4-7f2e-7b3a-9c1d-2e4f6a8b0c1d"));
        assert!(is_valid_id("agent_01"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("../etc/passwd"));
        assert!(!is_valid_id(&"x".repeat(MAX_ID_LEN + 1)));
    }

    #[test]
    fn test_generated_agent_id_is_valid() {
        let agent = AgentInfo::new("u1", "web-01");
        assert!(is_valid_id(&agent.id));
    }

    #[test]
    fn test_system_info_skips_blank_fields() {
        let mut agent = AgentInfo::new("u1", "web-01");
        agent.os_version = "Ubuntu 24.04".to_string();
        let info = agent.system_info();
        assert_eq!(info.get("Hostname").map(String::as_str), Some("web-01"));
        assert_eq!(info.get("OS").map(String::as_str), Some("Ubuntu 24.04"));
        assert!(!info.contains_key("Kernel"));
    }

    #[tokio::test]
    async fn test_registry_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");

        let registry = AgentRegistry::open(&path).unwrap();
        let agent = AgentInfo::new("u1", "db-01");
        let id = agent.id.clone();
        registry.register(agent).await.unwrap();

        let reopened = AgentRegistry::open(&path).unwrap();
        let found = reopened.find_agent(&id).await.unwrap().unwrap();
        assert_eq!(found.hostname, "db-01");
        assert_eq!(reopened.agents_for_user("u1").await.len(), 1);
        assert!(reopened.agents_for_user("u2").await.is_empty());
    }
}
