use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use log::trace;

use super::{ByteRange, ByteRangeResource};
use crate::error::{EdfError, Result};

enum Source {
    Memory(Bytes),
    File { path: PathBuf, size: u64 },
}

/// Bytes that live on this machine: a buffer already in memory or a file on disk
///
/// ```rust
/// use edfstream::resource::{ByteRange, ByteRangeResource, LocalResource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> edfstream::Result<()> {
/// let resource = LocalResource::from_bytes("demo.edf", b"0123456789".to_vec());
/// let bytes = resource.read_bytes(ByteRange::new(2, 5)).await?;
/// assert_eq!(&bytes[..], b"234");
/// # Ok(())
/// # }
/// ```
pub struct LocalResource {
    name: String,
    source: Source,
}

impl LocalResource {
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        LocalResource {
            name: name.into(),
            source: Source::Memory(bytes.into()),
        }
    }

    /// Opens a file for positioned reads; nothing is loaded up front
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(LocalResource {
            name,
            source: Source::File { path: path.to_path_buf(), size },
        })
    }

    fn total_size(&self) -> u64 {
        match &self.source {
            Source::Memory(bytes) => bytes.len() as u64,
            Source::File { size, .. } => *size,
        }
    }
}

#[async_trait]
impl ByteRangeResource for LocalResource {
    async fn read_bytes(&self, range: ByteRange) -> Result<Bytes> {
        let size = self.total_size();
        let (from, till) = range.resolve(Some(size));
        let from = from.min(size);
        let till = till.unwrap_or(size).min(size).max(from);

        trace!("local read {} [{}, {})", self.name, from, till);

        match &self.source {
            Source::Memory(bytes) => Ok(bytes.slice(from as usize..till as usize)),
            Source::File { path, .. } => {
                let path = path.clone();
                let len = (till - from) as usize;
                tokio::task::spawn_blocking(move || -> Result<Bytes> {
                    let mut file = File::open(&path)?;
                    file.seek(SeekFrom::Start(from))?;
                    let mut buf = vec![0u8; len];
                    file.read_exact(&mut buf)?;
                    Ok(Bytes::from(buf))
                })
                .await
                .map_err(|e| EdfError::transport(format!("local read task failed: {}", e)))?
            }
        }
    }

    fn size(&self) -> Option<u64> {
        Some(self.total_size())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
