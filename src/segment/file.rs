//! Segment file frame format.
//!
//! ```text
//! +----------+----------+-------------------------+
//! |  Length  |  CRC32   | JournalRecord (prost)   |
//! | (4 bytes)| (4 bytes)| (Length bytes)          |
//! +----------+----------+-------------------------+
//! ```
//!
//! Integers are big-endian. The CRC covers the payload only. A frame that is
//! cut short or fails its CRC marks the end of valid data: everything from its
//! position on is a torn tail and gets truncated on recovery.

use std::fs::File;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::path::PathBuf;

use bytes::Buf;
use bytes::BufMut;
use bytes::BytesMut;
use prost::Message;
use tracing::debug;
use tracing::warn;

use crate::file_io::create_parent_dir_if_not_exist;
use crate::proto::journal_record::JournalRecord;
use crate::Result;
use crate::StorageError;

pub const FRAME_HEADER_SIZE: usize = 8;

/// Upper bound of one record payload; larger length fields are garbage.
pub const FRAME_PAYLOAD_MAX: usize = 256 * 1024 * 1024;

/// Appends one encoded frame to `buf` and returns the frame size.
pub fn encode_frame(
    record: &JournalRecord,
    buf: &mut BytesMut,
) -> Result<usize> {
    let payload = record.encode_to_vec();
    if payload.len() > FRAME_PAYLOAD_MAX {
        return Err(StorageError::RecordTooLarge {
            size: payload.len(),
            max: FRAME_PAYLOAD_MAX,
        }
        .into());
    }

    buf.reserve(FRAME_HEADER_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_u32(crc32fast::hash(&payload));
    buf.extend_from_slice(&payload);
    Ok(FRAME_HEADER_SIZE + payload.len())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadFrame {
    pub record: JournalRecord,
    /// Byte position of the frame header inside the file
    pub position: u64,
    /// Header plus payload
    pub size: u64,
}

impl ReadFrame {
    pub fn next_position(&self) -> u64 {
        self.position + self.size
    }
}

/// Outcome of scanning a file from some position to its end
#[derive(Debug, Default)]
pub struct ScanResult {
    pub frames: Vec<ReadFrame>,
    /// End of the last intact frame
    pub valid_len: u64,
    /// Bytes after `valid_len` that do not form an intact frame
    pub torn_bytes: u64,
}

pub struct SegmentFile {
    path: PathBuf,
    file: File,
}

impl SegmentFile {
    pub fn open(path: &Path) -> Result<Self> {
        create_parent_dir_if_not_exist(path)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!("opened segment file {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn write_at(
        &self,
        buf: &[u8],
        position: u64,
    ) -> Result<()> {
        self.file.write_all_at(buf, position)?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Drops everything from `len` on
    pub fn truncate(
        &self,
        len: u64,
    ) -> Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Reads the frame at `position`.
    ///
    /// Returns `Ok(None)` when the file ends inside (or exactly before) the
    /// frame and `DataCorruption` when the frame fails its checksum.
    pub fn read_frame(
        &self,
        position: u64,
    ) -> Result<Option<ReadFrame>> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        if !self.read_exact_or_eof(&mut header, position)? {
            return Ok(None);
        }
        let mut header_buf = &header[..];
        let len = header_buf.get_u32() as usize;
        let crc = header_buf.get_u32();

        if len > FRAME_PAYLOAD_MAX {
            return Err(self.corruption(position, "length exceeds maximum"));
        }

        let mut payload = vec![0u8; len];
        if !self.read_exact_or_eof(&mut payload, position + FRAME_HEADER_SIZE as u64)? {
            return Ok(None);
        }

        if crc32fast::hash(&payload) != crc {
            return Err(self.corruption(position, "checksum mismatch"));
        }

        let record =
            JournalRecord::decode(payload.as_slice()).map_err(|_| self.corruption(position, "undecodable record"))?;

        Ok(Some(ReadFrame {
            record,
            position,
            size: (FRAME_HEADER_SIZE + len) as u64,
        }))
    }

    /// Reads consecutive frames starting at `position` until the end of the
    /// file or the first damaged frame.
    pub fn scan_from(
        &self,
        position: u64,
    ) -> Result<ScanResult> {
        let file_len = self.len()?;
        let mut result = ScanResult {
            valid_len: position,
            ..Default::default()
        };

        let mut cursor = position;
        while cursor < file_len {
            match self.read_frame(cursor) {
                Ok(Some(frame)) => {
                    cursor = frame.next_position();
                    result.frames.push(frame);
                }
                Ok(None) => break,
                Err(crate::Error::System(crate::SystemError::Storage(StorageError::DataCorruption { location }))) => {
                    warn!("stop scanning at damaged frame {}", location);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.valid_len = cursor;
        result.torn_bytes = file_len.saturating_sub(cursor);
        Ok(result)
    }

    /// Removes the file; a file that is already gone is fine.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            }
            .into()),
        }
    }

    fn read_exact_or_eof(
        &self,
        buf: &mut [u8],
        position: u64,
    ) -> Result<bool> {
        match self.file.read_exact_at(buf, position) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(StorageError::IoError(e).into()),
        }
    }

    fn corruption(
        &self,
        position: u64,
        reason: &str,
    ) -> crate::Error {
        StorageError::DataCorruption {
            location: format!("{:?}@{} ({})", self.path, position, reason),
        }
        .into()
    }
}
