// src/persistence/snapshot.rs
//! Scope snapshots
//!
//! Snapshots are written as pretty-printed JSON.

use crate::generation::cache::ProxyScope;
use crate::generation::emitter::{Implementation, ImplementationId};
use crate::generation::options::AttributeInfo;
use crate::generation::shape::ProxyKind;
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// One dispatch table slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub name: String,
    pub signature: String,

    /// Namespaced names of every declaration served by the slot
    pub declarations: Vec<String>,
    pub routing: String,
    pub intercepted: bool,
}

/// One generated implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationSummary {
    pub id: ImplementationId,
    pub name: String,
    pub shape: String,
    pub kind: ProxyKind,
    pub capabilities: Vec<String>,
    pub entries: Vec<EntrySummary>,
    pub attributes: Vec<AttributeInfo>,
    pub created_at: DateTime<Utc>,
}

impl From<&Implementation> for ImplementationSummary {
    fn from(implementation: &Implementation) -> Self {
        Self {
            id: implementation.id(),
            name: implementation.name().to_string(),
            shape: implementation.shape().to_string(),
            kind: implementation.kind(),
            capabilities: implementation
                .capabilities()
                .iter()
                .map(|c| c.type_ref.to_string())
                .collect(),
            entries: implementation
                .entries()
                .iter()
                .map(|entry| EntrySummary {
                    name: entry.exposed_name.clone(),
                    signature: entry.signature.to_string(),
                    declarations: entry
                        .declarations
                        .iter()
                        .map(|d| d.namespaced_name())
                        .collect(),
                    routing: entry.routing.to_string(),
                    intercepted: entry.intercepted,
                })
                .collect(),
            attributes: implementation.attributes().to_vec(),
            created_at: implementation.created_at(),
        }
    }
}

/// Everything a scope holds at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub taken_at: DateTime<Utc>,
    pub builds: usize,
    pub hits: usize,
    pub implementations: Vec<ImplementationSummary>,
}

impl ScopeSnapshot {
    pub fn find(&self, name: &str) -> Option<&ImplementationSummary> {
        self.implementations.iter().find(|i| i.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the snapshot to `path`, replacing any existing file
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        info!(
            "Wrote snapshot of {} implementation(s) to {}",
            self.implementations.len(),
            path.display()
        );
        Ok(())
    }
}

impl ProxyScope {
    /// Describe every implementation currently held by the scope
    pub fn snapshot(&self) -> ScopeSnapshot {
        ScopeSnapshot {
            taken_at: Utc::now(),
            builds: self.build_count(),
            hits: self.hit_count(),
            implementations: self
                .implementations()
                .iter()
                .map(|i| ImplementationSummary::from(i.as_ref()))
                .collect(),
        }
    }
}
