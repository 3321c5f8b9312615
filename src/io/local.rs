use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::ReadAt;

/// Local file reader with random access support.
///
/// Every call to [`ReadAt::read_at`] opens its own handle on the file, so
/// concurrent extraction units never share seek position or buffers.
pub struct LocalFileReader {
    path: PathBuf,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> std::io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            path: path.to_path_buf(),
            size,
        })
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        // A single read may return less than requested even mid-file
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(filled)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
