//! Persisted reconciliation state
//!
//! One [`Entry`] per bound resource, keyed by manifest label. Entries hold
//! the remote identity, the attributes applied by the last pass, and what
//! was observed remotely afterwards.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::Entry;
use nsxkit::{
    ApplicationService, SecurityGroup, SecurityGroupSpec, SecurityPolicy, SecurityPolicySpec,
    ServiceSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub type GroupEntry = Entry<SecurityGroupSpec, SecurityGroup>;
pub type ServiceEntry = Entry<ServiceSpec, ApplicationService>;
pub type PolicyEntry = Entry<SecurityPolicySpec, SecurityPolicy>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub security_groups: BTreeMap<String, GroupEntry>,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,

    #[serde(default)]
    pub security_policies: BTreeMap<String, PolicyEntry>,

    /// Last time the state was saved
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl State {
    /// Load state from disk, or return default if file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;
        let state: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;

        log::debug!("Loaded state from {} ({} entries)", path.display(), state.len());
        Ok(state)
    }

    /// Stamp and save state to disk
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        self.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(&self).context("Failed to serialize state")?;

        // Write-then-rename so an interrupted save keeps the previous file
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to write state file: {}", path.display()))?;

        log::debug!("Saved state to {}", path.display());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.security_groups.len() + self.services.len() + self.security_policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remote id of a bound group, by label
    pub fn group_id(&self, label: &str) -> Option<&str> {
        self.security_groups
            .get(label)
            .map(|e| e.identity.remote_id.as_str())
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Identity;
    use nsxkit::Scope;
    use tempfile::TempDir;

    fn group_entry(id: &str, name: &str) -> GroupEntry {
        Entry {
            applied: SecurityGroupSpec::new(name),
            identity: Identity::owned(id, name, false),
            observed: Some(SecurityGroup {
                object_id: id.into(),
                name: name.into(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let state = State::load(&dir.path().join("state.json")).unwrap();
        assert!(state.is_empty());
        assert!(state.last_updated.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = State::default();
        state
            .security_groups
            .insert("web".into(), group_entry("securitygroup-1", "web"));
        state.services.insert(
            "https".into(),
            Entry {
                applied: ServiceSpec {
                    scope: Scope::new("datacenter-2"),
                    name: "https".into(),
                    description: "tls".into(),
                    protocol: "TCP".into(),
                    ports: Some("443".into()),
                    no_delete: true,
                },
                identity: Identity::owned("application-2", "https", true),
                observed: None,
            },
        );
        state.save(&path).unwrap();
        assert!(state.last_updated.is_some());
        assert!(!path.with_extension("tmp").exists());

        let loaded = State::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.security_groups["web"], state.security_groups["web"]);
        assert_eq!(loaded.services["https"], state.services["https"]);
        assert!(loaded.services["https"].identity.is_no_delete());
        assert_eq!(loaded.last_updated, state.last_updated);
    }

    #[test]
    fn test_group_id() {
        let mut state = State::default();
        state
            .security_groups
            .insert("web".into(), group_entry("securitygroup-1", "web"));
        assert_eq!(state.group_id("web"), Some("securitygroup-1"));
        assert_eq!(state.group_id("db"), None);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        let err = State::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse state file"));
    }
}
