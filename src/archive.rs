//! Zip archives written straight onto the response body.
//!
//! The archive is produced on a blocking thread and handed to the response as
//! a stream of chunks through a bounded channel. Headers are already sent by
//! the time entries are read, so a failure part-way through ends the body
//! early instead of producing a JSON error.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use log::{debug, error};
use thiserror::Error;
use tokio::sync::mpsc;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to add {name} to archive: {source}")]
    Entry { name: String, source: io::Error },
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Name inside the archive.
    pub name: String,
    pub path: PathBuf,
}

pub fn archive_filename(now: DateTime<Utc>) -> String {
    format!("filedock-files-{}.zip", now.format("%Y-%m-%dT%H-%M-%S"))
}

/// Write `entries` as a deflated zip to a non-seekable writer. Returns the
/// number of entries written.
pub fn write_archive<W: Write>(writer: W, entries: &[ArchiveEntry]) -> Result<usize, ArchiveError> {
    let mut zip = ZipWriter::new_stream(writer);

    for entry in entries {
        let entry_err = |source| ArchiveError::Entry {
            name: entry.name.clone(),
            source,
        };
        let mut file = File::open(&entry.path).map_err(entry_err)?;
        let len = file.metadata().map_err(entry_err)?.len();

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9))
            .large_file(len > u32::MAX as u64);
        zip.start_file(entry.name.as_str(), options)?;
        io::copy(&mut file, &mut zip).map_err(entry_err)?;
        debug!("Added {} ({} bytes) to archive", entry.name, len);
    }

    zip.finish()?;
    Ok(entries.len())
}

type Chunk = Result<Bytes, io::Error>;

/// `Write` adapter that forwards fixed-size chunks into a channel. Must be
/// used from a blocking thread.
struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Chunk>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(CHUNK_SIZE),
        ));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        // the zip writer owns us; the trailing central directory lands here
        let _ = self.send_buffered();
    }
}

/// Start building the archive in the background and return its byte stream.
pub fn stream_archive(entries: Vec<ArchiveEntry>) -> impl Stream<Item = Chunk> {
    let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_DEPTH);

    tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx.clone());
        match write_archive(writer, &entries) {
            Ok(count) => debug!("Archive of {count} file(s) finished"),
            Err(e) => {
                error!("Error creating archive: {e}");
                let _ = tx.blocking_send(Err(io::Error::new(io::ErrorKind::Other, e.to_string())));
            }
        }
    });

    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
}
