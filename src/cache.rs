//! File-backed result set cache.
//!
//! A cache file is a fixed header followed by the same backend frames the
//! server sends for a result set:
//!
//! ```text
//! magic      11 bytes  "ZRELAYCACHE"
//! version    u16       1
//! expires_at i64       unix seconds, 0 = never
//! 'T' describe, 'D' data row*, 'C' batch end (end of result set)
//! ```
//!
//! A writer interrupted by a suspend leaves no end frame. Readers treat the
//! last complete row as the end, and [`CacheWriter::append`] continues the
//! file after dropping a torn trailing frame.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::buffer_set::BufferSet;
use crate::error::{CacheError, Error, Result};
use crate::handler::RowHandler;
use crate::protocol::backend::{BatchEnd, DataRow, Describe, msg_type};
use crate::protocol::codec::FRAME_HEADER_LEN;
use crate::protocol::types::{I64BE, U16BE};

/// Magic bytes at the start of every cache file.
pub const CACHE_MAGIC: [u8; 11] = *b"ZRELAYCACHE";

/// Cache file format version.
pub const CACHE_VERSION: u16 = 1;

/// TTL applied when none is set, in seconds.
pub const DEFAULT_CACHE_TTL: u64 = 600;

/// Cache file header (21 bytes).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct CacheHeader {
    /// `CACHE_MAGIC`
    pub magic: [u8; 11],
    /// `CACHE_VERSION`
    pub version: U16BE,
    /// Expiry in unix seconds, 0 = never
    pub expires_at: I64BE,
}

impl CacheHeader {
    /// Create a header expiring at `expires_at`.
    pub fn new(expires_at: i64) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CACHE_VERSION.into(),
            expires_at: expires_at.into(),
        }
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; size_of::<CacheHeader>()];
        reader.read_exact(&mut bytes).map_err(corrupt_on_eof)?;
        let header =
            CacheHeader::read_from_bytes(&bytes).map_err(|_| Error::from(CacheError::Corrupt))?;
        if header.magic != CACHE_MAGIC || header.version.get() != CACHE_VERSION {
            return Err(CacheError::Corrupt.into());
        }
        Ok(header)
    }

    /// Check whether the file has expired at `now` (unix seconds).
    pub fn is_expired(&self, now: i64) -> bool {
        let expires_at = self.expires_at.get();
        expires_at != 0 && now >= expires_at
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

fn corrupt_on_eof(err: impl Into<Error>) -> Error {
    match err.into() {
        Error::Io(e) if e.kind() == ErrorKind::UnexpectedEof => CacheError::Corrupt.into(),
        Error::Protocol(_) => CacheError::Corrupt.into(),
        other => other,
    }
}

fn open_existing(path: &Path, write: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(write)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => CacheError::NotFound.into(),
            _ => Error::Io(e),
        })
}

/// Writes a result set to a cache file as it is fetched.
///
/// A created file is only truncated once the first frame arrives, so a
/// statement the server rejects leaves an earlier cache at the path intact.
pub struct CacheWriter {
    file: BufWriter<File>,
    path: PathBuf,
    expires_at: i64,
    started: bool,
    buf: Vec<u8>,
    described: bool,
    finished: bool,
}

impl CacheWriter {
    /// Create (or truncate) a cache file that expires `ttl` seconds from now.
    /// A TTL of 0 never expires.
    pub fn create(path: impl AsRef<Path>, ttl: u64) -> Result<Self> {
        let expires_at = if ttl == 0 {
            0
        } else {
            unix_now().saturating_add(i64::try_from(ttl).unwrap_or(i64::MAX))
        };
        Self::create_with_expiry(path, expires_at)
    }

    /// Create (or truncate) a cache file with an absolute expiry.
    pub fn create_with_expiry(path: impl AsRef<Path>, expires_at: i64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            file: BufWriter::new(file),
            path,
            expires_at,
            started: false,
            buf: Vec::with_capacity(1024),
            described: false,
            finished: false,
        })
    }

    /// Reopen a cache file to add more rows.
    ///
    /// The expiry is kept. A torn trailing frame and any end frame are cut
    /// off so the new rows follow the last complete row.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = open_existing(&path, true)?;

        let (described, keep) = {
            let mut reader = BufReader::new(&mut file);
            CacheHeader::read_from(&mut reader)?;
            scan_complete_frames(&mut reader, &path)?
        };

        file.set_len(keep)?;
        file.seek(SeekFrom::Start(keep))?;
        debug!(path = %path.display(), offset = keep, "appending to result cache");

        Ok(Self {
            file: BufWriter::new(file),
            path,
            expires_at: 0,
            started: true,
            buf: Vec::with_capacity(1024),
            described,
            finished: false,
        })
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The end frame has been written.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Replace whatever the file held with a fresh header.
    fn start(&mut self) -> Result<()> {
        debug!(path = %self.path.display(), expires_at = self.expires_at, "creating result cache");
        let file = self.file.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        self.file.write_all(CacheHeader::new(self.expires_at).as_bytes())?;
        self.started = true;
        Ok(())
    }

    fn flush_frame(&mut self) -> Result<()> {
        if !self.started {
            self.start()?;
        }
        self.file.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    /// Write the end frame if missing and flush.
    pub fn finish(mut self) -> Result<()> {
        if !self.finished {
            self.batch_end(BatchEnd::new(true))?;
        }
        self.file.flush()?;
        Ok(())
    }

    /// Flush and close without an end frame, leaving the file appendable.
    pub fn detach(mut self) -> Result<()> {
        debug!(path = %self.path.display(), "detaching result cache");
        self.file.flush()?;
        Ok(())
    }

    /// Give up on a result set that never produced a frame.
    ///
    /// An earlier cache at the path is left as it was; a file opened empty
    /// for this writer is removed.
    pub fn abandon(self) -> Result<()> {
        if !self.started && self.file.get_ref().metadata()?.len() == 0 {
            debug!(path = %self.path.display(), "removing unused result cache");
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Walk the frames after the header.
///
/// Returns whether a describe frame was seen and the offset after the last
/// complete describe or row frame.
fn scan_complete_frames<R: Read>(reader: &mut R, path: &Path) -> Result<(bool, u64)> {
    let mut buffer_set = BufferSet::new();
    let mut offset = size_of::<CacheHeader>() as u64;
    let mut described = false;

    loop {
        match buffer_set.read_frame(reader) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => match corrupt_on_eof(e) {
                Error::Cache(CacheError::Corrupt) => {
                    warn!(path = %path.display(), offset, "dropping torn frame at end of result cache");
                    break;
                }
                other => return Err(other),
            },
        }
        match buffer_set.type_byte {
            msg_type::DESCRIBE => described = true,
            msg_type::DATA_ROW => {}
            // Rows continue after a previous end marker.
            msg_type::BATCH_END => break,
            _ => return Err(CacheError::Corrupt.into()),
        }
        offset += (FRAME_HEADER_LEN + buffer_set.read_buffer.len()) as u64;
    }

    Ok((described, offset))
}

impl RowHandler for CacheWriter {
    fn describe(&mut self, desc: &Describe<'_>) -> Result<()> {
        if !self.described {
            desc.write_raw(&mut self.buf);
            self.flush_frame()?;
            self.described = true;
        }
        Ok(())
    }

    fn row(&mut self, row: DataRow<'_>) -> Result<()> {
        row.write_raw(&mut self.buf);
        self.flush_frame()
    }

    fn batch_end(&mut self, end: BatchEnd) -> Result<()> {
        if end.end_of_result_set && !self.finished {
            BatchEnd::new(true).write(&mut self.buf);
            self.flush_frame()?;
            self.finished = true;
        }
        self.file.flush()?;
        Ok(())
    }
}

/// Reads a result set back from a cache file.
pub struct CacheReader {
    file: BufReader<File>,
    path: PathBuf,
    buffer_set: BufferSet,
    describe: Vec<u8>,
    finished: bool,
}

impl CacheReader {
    /// Open a cache file.
    ///
    /// Fails with `CacheError::NotFound` if the file is missing,
    /// `CacheError::Expired` past its TTL and `CacheError::Corrupt` if it is
    /// not a result cache.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_at(path, unix_now())
    }

    /// Open a cache file, checking expiry against `now` (unix seconds).
    pub fn open_at(path: impl AsRef<Path>, now: i64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = BufReader::new(open_existing(&path, false)?);
        let header = CacheHeader::read_from(&mut file)?;
        if header.is_expired(now) {
            debug!(path = %path.display(), "result cache expired");
            return Err(CacheError::Expired.into());
        }

        let mut buffer_set = BufferSet::new();
        if !buffer_set.read_frame(&mut file).map_err(corrupt_on_eof)?
            || buffer_set.type_byte != msg_type::DESCRIBE
        {
            return Err(CacheError::Corrupt.into());
        }
        let describe = std::mem::take(&mut buffer_set.read_buffer);
        Describe::parse(&describe).map_err(corrupt_on_eof)?;

        debug!(path = %path.display(), "opened result cache");
        Ok(Self {
            file,
            path,
            buffer_set,
            describe,
            finished: false,
        })
    }

    /// Path of the file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows have been read.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed the stored column description to `handler`.
    pub fn describe<H: RowHandler>(&self, handler: &mut H) -> Result<()> {
        let desc = Describe::parse(&self.describe).map_err(corrupt_on_eof)?;
        handler.describe(&desc)
    }

    /// Read the next row frame into the buffer. Returns false at the end.
    fn next_row(&mut self) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        if !self
            .buffer_set
            .read_frame(&mut self.file)
            .map_err(corrupt_on_eof)?
        {
            self.finished = true;
            return Ok(false);
        }
        match self.buffer_set.type_byte {
            msg_type::DATA_ROW => Ok(true),
            msg_type::BATCH_END => {
                self.finished = true;
                Ok(false)
            }
            _ => Err(CacheError::Corrupt.into()),
        }
    }

    /// Skip `skip` rows, then feed at most `limit` rows (0 = all) to
    /// `handler`, followed by a batch end carrying the rows really skipped.
    ///
    /// The end flag is set only when fewer rows than requested were left.
    pub fn fetch<H: RowHandler>(&mut self, skip: u64, limit: u32, handler: &mut H) -> Result<()> {
        let mut rows_skipped = 0;
        while rows_skipped < skip && self.next_row()? {
            rows_skipped += 1;
        }

        let mut sent = 0u32;
        while limit == 0 || sent < limit {
            if !self.next_row()? {
                break;
            }
            let row = DataRow::parse(&self.buffer_set.read_buffer).map_err(corrupt_on_eof)?;
            handler.row(row)?;
            sent += 1;
        }

        handler.batch_end(BatchEnd {
            end_of_result_set: self.finished,
            rows_skipped,
        })
    }
}
