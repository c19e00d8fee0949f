use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{SampleRecord, SampleStore};
use crate::event_log::{EventLogError, JsonLinesFile};

/// Appends one [`SampleRecord`] per line to a file.
pub struct JsonLinesSampleLog {
    path: PathBuf,
    file: JsonLinesFile,
}

impl JsonLinesSampleLog {
    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EventLogError> {
        let path = path.as_ref().to_path_buf();
        let file = JsonLinesFile::open(&path).await?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SampleStore for JsonLinesSampleLog {
    async fn save(&self, record: &SampleRecord) -> Result<(), EventLogError> {
        self.file.append(|_| record).await
    }

    fn name(&self) -> &str {
        self.file.display()
    }
}
