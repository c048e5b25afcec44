//! Chunked file transfer helpers.
//!
//! Downloads are cut into fixed 256 KiB segments, one per stream message.
//! Uploads declare their total size up front and are reassembled in memory
//! before the bytes are handed to storage.

use crate::error::AppError;

/// Size of every streamed chunk except possibly the last one.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Split `data` into owned chunks of at most [`CHUNK_SIZE`] bytes.
pub fn chunk_bytes(data: &[u8]) -> Vec<Vec<u8>> {
    data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect()
}

/// Reassembles an upload whose total size was declared in its first message.
#[derive(Debug)]
pub struct UploadBuffer {
    declared_size: usize,
    max_size: usize,
    data: Vec<u8>,
}

impl UploadBuffer {
    /// Start a buffer for `declared_size` bytes, refusing anything above `max_size`.
    pub fn new(declared_size: i64, max_size: usize) -> Result<Self, AppError> {
        if declared_size < 0 {
            return Err(AppError::InvalidArgument(anyhow::anyhow!(
                "file_size must not be negative"
            )));
        }
        let declared_size = declared_size as usize;
        if declared_size > max_size {
            return Err(AppError::InvalidArgument(anyhow::anyhow!(
                "File too large ({} bytes, max {} bytes)",
                declared_size,
                max_size
            )));
        }
        Ok(Self {
            declared_size,
            max_size,
            data: Vec::with_capacity(declared_size),
        })
    }

    /// Append one chunk, failing as soon as the declared size is exceeded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), AppError> {
        let received = self.data.len() + chunk.len();
        if received > self.declared_size || received > self.max_size {
            return Err(AppError::InvalidArgument(anyhow::anyhow!(
                "Received {} bytes, more than the declared {} bytes",
                received,
                self.declared_size
            )));
        }
        self.data.extend_from_slice(chunk);
        Ok(())
    }

    pub fn received(&self) -> usize {
        self.data.len()
    }

    /// Finish the upload, checking that every declared byte arrived.
    pub fn finish(self) -> Result<Vec<u8>, AppError> {
        if self.data.len() != self.declared_size {
            return Err(AppError::InvalidArgument(anyhow::anyhow!(
                "Received {} bytes, expected {} bytes",
                self.data.len(),
                self.declared_size
            )));
        }
        Ok(self.data)
    }
}
