//! Persisted deployment marker.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::PduError;

/// Where the satellite is in its one-shot deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    NotDeployed,
    /// Burn wire fired; the deployment window is running.
    Deploying,
    Deployed,
}

/// Non-volatile storage for the deployed marker.
pub trait DeploymentStore: Send {
    fn is_deployed(&self) -> Result<bool, PduError>;

    fn mark_deployed(&mut self) -> Result<(), PduError>;
}

/// Marker stored as the existence of a file.
#[derive(Debug, Clone)]
pub struct FlagFileStore {
    path: PathBuf,
}

impl FlagFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, source: std::io::Error) -> PduError {
        PduError::Store {
            path: self.path.clone(),
            source,
        }
    }
}

impl DeploymentStore for FlagFileStore {
    fn is_deployed(&self) -> Result<bool, PduError> {
        self.path.try_exists().map_err(|err| self.store_error(err))
    }

    fn mark_deployed(&mut self) -> Result<(), PduError> {
        std::fs::write(&self.path, b"deployed\n").map_err(|err| self.store_error(err))
    }
}

/// In-memory marker. Clones share the flag, so a store can outlive the
/// channel that wrote it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    deployed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(deployed: bool) -> Self {
        Self {
            deployed: Arc::new(AtomicBool::new(deployed)),
        }
    }
}

impl DeploymentStore for MemoryStore {
    fn is_deployed(&self) -> Result<bool, PduError> {
        Ok(self.deployed.load(Ordering::SeqCst))
    }

    fn mark_deployed(&mut self) -> Result<(), PduError> {
        self.deployed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
