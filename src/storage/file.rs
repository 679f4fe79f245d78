//! Positional, fixed-width file I/O. Owns the single `File` handle for the duration of
//! one public `Store` operation (see `crate::store`) and nothing longer than that.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::Error;

pub struct FileManager {
    file: File,
    s_header: usize,
    s_node: usize,
}

impl FileManager {
    pub fn open(path: &Path, s_header: usize, s_node: usize) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FileManager {
            file,
            s_header,
            s_node,
        })
    }

    /// Byte offset one past the header record, where node slot 0 begins.
    pub fn first_slot_offset(&self) -> u64 {
        self.s_header as u64 + 1
    }

    pub fn read_header_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; self.s_header + 1];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_header_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        debug_assert_eq!(bytes.len(), self.s_header + 1);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    pub fn read_slot(&mut self, offset: u64) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; self.s_node];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_slot(&mut self, offset: u64, bytes: &[u8]) -> Result<(), Error> {
        debug_assert_eq!(bytes.len(), self.s_node);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Appends a new slot at the current file end and returns its offset.
    pub fn append_slot(&mut self, bytes: &[u8]) -> Result<u64, Error> {
        debug_assert_eq!(bytes.len(), self.s_node);
        let offset = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(bytes)?;
        Ok(offset)
    }

    /// Shrinks the file so that the slot previously occupying `[offset, offset +
    /// s_node)` is dropped.
    pub fn truncate_to(&mut self, offset: u64) -> Result<(), Error> {
        self.file.set_len(offset)?;
        Ok(())
    }

    pub fn file_len(&mut self) -> Result<u64, Error> {
        Ok(self.file.seek(SeekFrom::End(0))?)
    }
}

/// Creates a brand new, empty store file: just the header slot, no nodes yet.
pub fn initialize_file(path: &Path, s_header: usize, header_bytes: &[u8]) -> Result<(), Error> {
    debug_assert_eq!(header_bytes.len(), s_header + 1);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(header_bytes)?;
    Ok(())
}
