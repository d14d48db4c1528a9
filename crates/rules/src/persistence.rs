use std::path::{Path, PathBuf};

use ottoengine_core::{AutomationRule, Error, Result};

/// File-based rule persistence: one JSON file per rule, named `{id}.json`,
/// under a configured directory.
#[derive(Debug, Clone)]
pub struct RuleStore {
    directory: PathBuf,
}

impl RuleStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{id}.json"))
    }

    /// Loads every rule file in the directory. A file that fails to parse is
    /// skipped and logged — other rules continue to load.
    pub async fn load_all(&self) -> Result<Vec<AutomationRule>> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| Error::ConnectionLost(format!("cannot read rules directory: {e}")))?;

        let mut rules = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::ConnectionLost(format!("cannot read rules directory: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_path(&path).await {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unloadable rule file");
                }
            }
        }
        Ok(rules)
    }

    async fn load_path(&self, path: &Path) -> Result<AutomationRule> {
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::RuleLoadError {
                id: id.clone(),
                message: e.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|e| Error::RuleLoadError {
            id,
            message: e.to_string(),
        })
    }

    pub async fn load(&self, id: &str) -> Result<AutomationRule> {
        self.load_path(&self.path_for(id)).await
    }

    pub async fn save(&self, rule: &AutomationRule) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(rule).map_err(|e| Error::InvalidSpec {
            field: "rule".to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::write(self.path_for(&rule.id), bytes)
            .await
            .map_err(|e| Error::ConnectionLost(format!("cannot write rule file: {e}")))
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        tokio::fs::remove_file(self.path_for(id))
            .await
            .map_err(|e| Error::NotFound(format!("rule '{id}' not found: {e}")))
    }

    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| Error::ConnectionLost(format!("cannot read rules directory: {e}")))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::ConnectionLost(format!("cannot read rules directory: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ottoengine_core::Trigger;

    fn rule(id: &str) -> AutomationRule {
        AutomationRule {
            id: id.to_string(),
            description: String::new(),
            enabled: true,
            group: None,
            notes: None,
            triggers: Vec::<Trigger>::new(),
            rule_condition: None,
            actions: Vec::new(),
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let dir = tempdir();
        let store = RuleStore::new(&dir);
        store.save(&rule("r1")).await.unwrap();
        let loaded = store.load("r1").await.unwrap();
        assert_eq!(loaded.id, "r1");
        assert!(loaded.enabled);
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempdir();
        let store = RuleStore::new(&dir);
        store.save(&rule("r2")).await.unwrap();
        store.delete("r2").await.unwrap();
        assert!(store.load("r2").await.is_err());
    }

    #[tokio::test]
    async fn malformed_file_is_skipped_not_fatal() {
        let dir = tempdir();
        tokio::fs::write(dir.join("broken.json"), b"not json")
            .await
            .unwrap();
        let store = RuleStore::new(&dir);
        store.save(&rule("r3")).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "r3");
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ottoengine-rules-test-{}",
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
