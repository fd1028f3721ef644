use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::ArchiveError;

/// Prefix put in front of every source identifier to form an entry name.
pub const ENTRY_PREFIX: &str = "resized-";
/// Conventional file name for the finished archive.
pub const ARCHIVE_FILENAME: &str = "resized-images.zip";

/// Archive entry name for a source identifier.
pub fn entry_name(identifier: &str) -> String {
    format!("{ENTRY_PREFIX}{identifier}")
}

/// Collects named buffers and seals them into one zip archive.
///
/// Entries keep their insertion order. Every entry is stored with the same
/// timestamp and permissions, so identical input produces identical bytes.
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    entries: Vec<(String, Vec<u8>)>,
    names: HashSet<String>,
    finalized: Option<Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Names must be unique and the archive must not be sealed.
    pub fn add(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        if self.finalized.is_some() {
            return Err(ArchiveError::Sealed);
        }
        let name = name.into();
        if !self.names.insert(name.clone()) {
            return Err(ArchiveError::DuplicateEntry(name));
        }
        self.entries.push((name, bytes));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.finalized.is_some()
    }

    /// Serialize all entries and seal the archive. Can only succeed once.
    pub fn finalize(&mut self) -> Result<&[u8], ArchiveError> {
        if self.finalized.is_some() {
            return Err(ArchiveError::Sealed);
        }
        let bytes = write_zip(&self.entries)?;
        // payloads now live in the zip; drop the loose copies
        self.entries.clear();
        Ok(self.finalized.insert(bytes).as_slice())
    }

    /// The sealed archive, if [`finalize`](Self::finalize) succeeded.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        self.finalized
    }
}

fn write_zip(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ArchiveError> {
    // JPEG payloads don't shrink under deflate, so store them as-is
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn read_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[test]
    fn test_entry_name_prefix() {
        assert_eq!(entry_name("a.png"), "resized-a.png");
    }

    #[test]
    fn test_entries_in_insertion_order() {
        let mut builder = ArchiveBuilder::new();
        builder.add("resized-b.png", b"second?".to_vec()).unwrap();
        builder.add("resized-a.png", b"no, first".to_vec()).unwrap();
        assert_eq!(builder.len(), 2);

        let bytes = builder.finalize().unwrap().to_vec();
        let entries = read_entries(&bytes);
        assert_eq!(
            entries,
            vec![
                ("resized-b.png".to_string(), b"second?".to_vec()),
                ("resized-a.png".to_string(), b"no, first".to_vec()),
            ]
        );
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let mut builder = ArchiveBuilder::new();
        builder.add("resized-a.png", vec![1]).unwrap();
        let err = builder.add("resized-a.png", vec![2]).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateEntry(name) if name == "resized-a.png"));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_sealed_archive_rejects_changes() {
        let mut builder = ArchiveBuilder::new();
        builder.add("resized-a.png", vec![1, 2, 3]).unwrap();
        builder.finalize().unwrap();
        assert!(builder.is_sealed());

        assert!(matches!(builder.add("resized-b.png", vec![4]), Err(ArchiveError::Sealed)));
        assert!(matches!(builder.finalize(), Err(ArchiveError::Sealed)));
        assert_eq!(read_entries(&builder.into_bytes().unwrap()).len(), 1);
    }

    #[test]
    fn test_empty_archive_is_valid_zip() {
        let mut builder = ArchiveBuilder::new();
        assert!(builder.is_empty());
        let bytes = builder.finalize().unwrap().to_vec();
        assert!(read_entries(&bytes).is_empty());
    }

    #[test]
    fn test_identical_input_identical_bytes() {
        let build = || {
            let mut builder = ArchiveBuilder::new();
            builder.add("resized-x.jpg", vec![7; 1024]).unwrap();
            builder.add("resized-y.jpg", vec![9; 64]).unwrap();
            builder.finalize().unwrap();
            builder.into_bytes().unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_into_bytes_before_finalize() {
        let mut builder = ArchiveBuilder::new();
        builder.add("resized-a.png", vec![1]).unwrap();
        assert!(builder.into_bytes().is_none());
    }
}
