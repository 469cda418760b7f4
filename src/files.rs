//! Payload file loading interface
//!
//! [`crate::efi::fs::VolumeFileLoader`] implements this on the volume the
//! application was loaded from.

use alloc::vec::Vec;
use r_efi::efi::Status;

/// Open-and-read access to files
///
/// Opening and reading are separate steps so a missing file and an
/// unreadable one can be reported differently.
pub trait FileLoader {
    /// Handle to an open file, closed when dropped
    type File;

    /// Open a file for reading
    ///
    /// `path` is UCS-2 without a terminator.
    fn open(&mut self, path: &[u16]) -> Result<Self::File, Status>;

    /// Read the whole file into a freshly allocated buffer
    ///
    /// Returns `OUT_OF_RESOURCES` if the buffer cannot be allocated.
    fn read_all(&mut self, file: &mut Self::File) -> Result<Vec<u8>, Status>;
}

/// In-memory file loader for testing
#[cfg(test)]
pub struct MemoryFiles {
    files: Vec<(alloc::string::String, Vec<u8>)>,
    /// Number of successful opens
    pub opens: usize,
    /// Number of read attempts
    pub reads: usize,
    /// Status to fail reads with
    pub fail_reads_with: Option<Status>,
}

#[cfg(test)]
impl MemoryFiles {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            opens: 0,
            reads: 0,
            fail_reads_with: None,
        }
    }

    /// Add a file
    pub fn with_file(mut self, path: &str, data: &[u8]) -> Self {
        self.files.push((path.into(), data.to_vec()));
        self
    }
}

#[cfg(test)]
impl FileLoader for MemoryFiles {
    type File = usize;

    fn open(&mut self, path: &[u16]) -> Result<usize, Status> {
        let path = crate::efi::utils::to_string(path);
        let idx = self
            .files
            .iter()
            .position(|(p, _)| *p == path)
            .ok_or(Status::NOT_FOUND)?;
        self.opens += 1;
        Ok(idx)
    }

    fn read_all(&mut self, file: &mut usize) -> Result<Vec<u8>, Status> {
        self.reads += 1;
        if let Some(status) = self.fail_reads_with {
            return Err(status);
        }
        Ok(self.files[*file].1.clone())
    }
}
