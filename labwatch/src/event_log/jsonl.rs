use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{EventLog, EventLogError, EventRecord};

/// Newline-delimited JSON appended to a writer, one record per line.
///
/// A write that fails midway leaves a fragment behind. The next record
/// then starts on a fresh line, so only the fragment is unreadable.
pub(crate) struct JsonLinesFile<W = File> {
    display: String,
    inner: Mutex<Writer<W>>,
}

struct Writer<W> {
    out: W,
    next_seq: u64,
    torn: bool,
}

impl JsonLinesFile<File> {
    /// Open `path` for appending, creating it if needed.
    pub(crate) async fn open(path: &Path) -> Result<Self, EventLogError> {
        let display = path.display().to_string();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| EventLogError::Io {
                path: display.clone(),
                source,
            })?;
        Ok(Self::from_writer(display, file))
    }
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesFile<W> {
    pub(crate) fn from_writer(display: String, out: W) -> Self {
        Self {
            display,
            inner: Mutex::new(Writer {
                out,
                next_seq: 1,
                torn: false,
            }),
        }
    }

    pub(crate) fn display(&self) -> &str {
        &self.display
    }

    /// Append the record `build` makes for the next sequence number.
    /// The number is only consumed when the write succeeds.
    pub(crate) async fn append<T, F>(&self, build: F) -> Result<(), EventLogError>
    where
        T: Serialize,
        F: FnOnce(u64) -> T,
    {
        let mut writer = self.inner.lock().await;

        let mut line = Vec::new();
        if writer.torn {
            line.push(b'\n');
        }
        serde_json::to_writer(&mut line, &build(writer.next_seq))?;
        line.push(b'\n');

        let result = async {
            writer.out.write_all(&line).await?;
            writer.out.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                writer.torn = false;
                writer.next_seq += 1;
                Ok(())
            }
            Err(source) => {
                writer.torn = true;
                Err(EventLogError::Io {
                    path: self.display.clone(),
                    source,
                })
            }
        }
    }
}

/// Appends one [`EventRecord`] per line to a file.
///
/// Sequence numbers restart at 1 with every process; `recorded_at`
/// orders records across restarts.
pub struct JsonLinesLog {
    path: PathBuf,
    file: JsonLinesFile,
}

impl JsonLinesLog {
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
impl EventLog for JsonLinesLog {
    async fn append(
        &self,
        event_type: &str,
        details: &Map<String, Value>,
    ) -> Result<(), EventLogError> {
        self.file
            .append(|seq| EventRecord::new(seq, event_type, details.clone()))
            .await
    }

    fn name(&self) -> &str {
        self.file.display()
    }
}
