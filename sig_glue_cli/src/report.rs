use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sig_glue::{BridgeKind, Relation, SignalStatistics};

/// One glue run as recorded in the statistics log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReportEntry {
    pub recorded_at: String,
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
    pub min: f64,
    pub duration: f64,
    pub relation: Relation,
    pub bridge: BridgeKind,
    pub fingerprint: String,
    pub params_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ReportEntry {
    pub fn new(
        stats: &SignalStatistics,
        relation: Relation,
        bridge: BridgeKind,
        fingerprint: String,
        params_hash: String,
        image: Option<String>,
    ) -> Self {
        Self {
            recorded_at: chrono::Utc::now().to_rfc3339(),
            mean: stats.mean,
            std_dev: stats.std_dev,
            max: stats.max,
            min: stats.min,
            duration: stats.duration,
            relation,
            bridge,
            fingerprint,
            params_hash,
            image,
        }
    }
}

/// Append-only list of report entries, stored as a JSON array.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct StatisticsLog {
    entries: Vec<ReportEntry>,
}

impl StatisticsLog {
    /// A missing file is an empty log.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) if bytes.iter().all(|b| b.is_ascii_whitespace()) => Ok(Self::default()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse statistics log {}", path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read statistics log {}", path.display()))
            }
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write statistics log {}", path.display()))
    }
}
