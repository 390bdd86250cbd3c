//! JSON persistence of the coordinator state and the single-use sets that
//! guard signed calls.

use anyhow::{Context, Result, bail};
use rng_coordinator::CoordinatorState;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::replay::SeenSet;

#[derive(Debug, Deserialize)]
pub struct Snapshot {
    pub coordinator: CoordinatorState,
    #[serde(default)]
    pub envelopes: SeenSet,
    #[serde(default)]
    pub deposits: SeenSet,
}

#[derive(Serialize)]
pub struct SnapshotRef<'a> {
    pub coordinator: &'a CoordinatorState,
    pub envelopes: &'a SeenSet,
    pub deposits: &'a SeenSet,
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the last snapshot. A missing file means a fresh deployment.
    pub async fn load(&self) -> Result<Option<Snapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read snapshot {}", self.path.display()));
            }
        };
        let snapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt snapshot {}", self.path.display()))?;
        Ok(Some(snapshot))
    }

    /// Write to a sibling temp file, then rename over the snapshot.
    pub async fn persist(&self, snapshot: &SnapshotRef<'_>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot).context("failed to encode snapshot")?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to move snapshot into {}", self.path.display()))?;
        Ok(())
    }
}

/// The restored state only trusts fulfillments signed by the oracle key it was
/// created with. A different key would have every answer rejected.
pub fn ensure_oracle_identity(state: &CoordinatorState, oracle: &Pubkey) -> Result<()> {
    let trusted = state.funding.coordinator_address;
    if trusted != *oracle {
        bail!(
            "snapshot trusts oracle {trusted} but ORACLE_KEYPAIR_PATH holds {oracle}; \
             restore the original oracle keypair"
        );
    }
    Ok(())
}
