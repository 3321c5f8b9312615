mod local;

pub use local::LocalFileReader;

use async_trait::async_trait;

/// Trait for random access reading from an archive's backing bytes
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer.
    ///
    /// Keeps reading until `buf` is full or the source is exhausted, so a
    /// return value smaller than `buf.len()` always means end of data.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;
}
