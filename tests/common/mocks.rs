use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use validate_tabular::error::Result;
use validate_tabular::{SessionSnapshot, SnapshotStore, UploadError};

/// Snapshot store whose backing storage is always unavailable
#[derive(Default)]
pub struct FailingSnapshotStore {
    attempts: AtomicUsize,
}

impl FailingSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> UploadError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        UploadError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "storage unavailable",
        ))
    }
}

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn load(&self) -> Result<Option<SessionSnapshot>> {
        Err(self.unavailable())
    }

    async fn save(&self, _snapshot: &SessionSnapshot) -> Result<()> {
        Err(self.unavailable())
    }
}
