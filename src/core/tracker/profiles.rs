//! Profile source
//!
//! Profiles arrive from an external feed. Failing to read it is the one
//! fatal condition of a run.

use crate::core::tracker::types::{Profile, TrackerError};
use serde::Deserialize;
use std::path::PathBuf;

#[async_trait::async_trait]
pub trait ProfileSource: Send + Sync {
    async fn list_profiles(&self) -> Result<Vec<Profile>, TrackerError>;
}

/// Accepts a bare array or a `{"data": [...]}` envelope
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileDocument {
    List(Vec<Profile>),
    Envelope { data: Vec<Profile> },
}

/// Profiles exported to a JSON file
pub struct JsonFileProfileSource {
    path: PathBuf,
}

impl JsonFileProfileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl ProfileSource for JsonFileProfileSource {
    async fn list_profiles(&self) -> Result<Vec<Profile>, TrackerError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            TrackerError::ProfileSourceError(format!("{}: {}", self.path.display(), e))
        })?;

        let document: ProfileDocument = serde_json::from_str(&content).map_err(|e| {
            TrackerError::ProfileSourceError(format!("{}: {}", self.path.display(), e))
        })?;

        Ok(match document {
            ProfileDocument::List(profiles) => profiles,
            ProfileDocument::Envelope { data } => data,
        })
    }
}

/// Fixed in-memory profile list
#[derive(Default)]
pub struct StaticProfileSource {
    profiles: Vec<Profile>,
}

impl StaticProfileSource {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }
}

#[async_trait::async_trait]
impl ProfileSource for StaticProfileSource {
    async fn list_profiles(&self) -> Result<Vec<Profile>, TrackerError> {
        Ok(self.profiles.clone())
    }
}
