//! Deployment record stores

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::{BrokerError, Result};
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentRecord;
use crate::utils::parse_deployment_id;

/// Persistence for deployment records. Implementations must be safe for concurrent use.
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    async fn exists_terraform_deployment(&self, id: &str) -> Result<bool>;

    /// Fails with `MissingDeployment` when absent
    async fn get_terraform_deployment(&self, id: &str) -> Result<DeploymentRecord>;

    /// Insert or replace by ID
    async fn store_terraform_deployment(&self, record: DeploymentRecord) -> Result<()>;

    async fn delete_terraform_deployment(&self, id: &str) -> Result<()>;

    /// Binding deployments of an instance, in ID order
    async fn get_binding_deployments(&self, instance_id: &str) -> Result<Vec<DeploymentRecord>>;

    /// Every deployment, in ID order
    async fn list_terraform_deployments(&self) -> Result<Vec<DeploymentRecord>>;
}

/// True when `id` names a binding of `instance_id`
fn is_binding_of(id: &str, instance_id: &str) -> bool {
    matches!(parse_deployment_id(id), Some((instance, binding)) if instance == instance_id && !binding.is_empty())
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, DeploymentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn exists_terraform_deployment(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(id))
    }

    async fn get_terraform_deployment(&self, id: &str) -> Result<DeploymentRecord> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::MissingDeployment(id.to_string()))
    }

    async fn store_terraform_deployment(&self, record: DeploymentRecord) -> Result<()> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_terraform_deployment(&self, id: &str) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn get_binding_deployments(&self, instance_id: &str) -> Result<Vec<DeploymentRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| is_binding_of(&record.id, instance_id))
            .cloned()
            .collect())
    }

    async fn list_terraform_deployments(&self) -> Result<Vec<DeploymentRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// One JSON file per deployment under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: Dir,
}

impl FileStore {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    fn record_file(&self, id: &str) -> File {
        self.dir.file(&format!("{}.json", file_stem(id)))
    }

    async fn read_all(&self) -> Result<Vec<DeploymentRecord>> {
        if !self.dir.exists().await {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for path in self.dir.list_files().await? {
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let record: DeploymentRecord = File::new(path).read_json().await.map_err(unavailable)?;
            records.push(record);
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

/// Reversible file name for an ID: `tf:a:b` is stored as `tf_a_b`, while a
/// literal `_`, `%` or `/` is percent-escaped so distinct IDs never collide
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            ':' => stem.push('_'),
            '_' => stem.push_str("%5F"),
            '%' => stem.push_str("%25"),
            '/' => stem.push_str("%2F"),
            '\\' => stem.push_str("%5C"),
            c => stem.push(c),
        }
    }
    stem
}

fn unavailable(err: BrokerError) -> BrokerError {
    match err {
        BrokerError::Io(e) => BrokerError::StoreUnavailable(e.to_string()),
        other => other,
    }
}

#[async_trait]
impl DeploymentStore for FileStore {
    async fn exists_terraform_deployment(&self, id: &str) -> Result<bool> {
        Ok(self.record_file(id).exists().await)
    }

    async fn get_terraform_deployment(&self, id: &str) -> Result<DeploymentRecord> {
        let file = self.record_file(id);
        if !file.exists().await {
            return Err(BrokerError::MissingDeployment(id.to_string()));
        }
        let record: DeploymentRecord = file.read_json().await.map_err(unavailable)?;
        if record.id != id {
            warn!("deployment file for {} holds record {}", id, record.id);
            return Err(BrokerError::MissingDeployment(id.to_string()));
        }
        Ok(record)
    }

    async fn store_terraform_deployment(&self, record: DeploymentRecord) -> Result<()> {
        debug!("storing deployment {}", record.id);
        self.record_file(&record.id)
            .write_json_atomic(&record)
            .await
            .map_err(unavailable)
    }

    async fn delete_terraform_deployment(&self, id: &str) -> Result<()> {
        self.record_file(id).delete().await.map_err(unavailable)
    }

    async fn get_binding_deployments(&self, instance_id: &str) -> Result<Vec<DeploymentRecord>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|record| is_binding_of(&record.id, instance_id))
            .collect())
    }

    async fn list_terraform_deployments(&self) -> Result<Vec<DeploymentRecord>> {
        self.read_all().await
    }
}
