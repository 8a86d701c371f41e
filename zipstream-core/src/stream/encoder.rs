use crate::codec;
use crate::config::ArchiveConfig;
use crate::error::EntryFailure;
use crate::gate::CancelFlag;
use crate::walk::WalkedEntry;
use crossbeam_channel::Sender;
use std::fs::File;
use std::io::{self, Read, Write};

const DEFLATE_LEVEL: u32 = 6;

/// What one encode task sends to the resequencing consumer: compressed
/// chunks in order, then exactly one trailer.
#[derive(Debug)]
pub enum EntryMsg {
    Chunk(Vec<u8>),
    Done(EntryTrailer),
}

/// Final accounting for one entry. `c_size` counts the bytes already pushed
/// through the channel, so the consumer's data descriptor is accurate even
/// for an entry that failed mid-read.
#[derive(Debug)]
pub struct EntryTrailer {
    pub crc32: u32,
    pub u_size: u64,
    pub c_size: u64,
    pub failure: Option<EntryFailure>,
}

/// Read and encode one file entry, pushing output through `tx`.
///
/// Content is consumed in `chunk_size` reads with the cancel flag checked
/// at every boundary; the bounded channel blocks the task when the consumer
/// is behind, which is the pipeline's backpressure. If the consumer is gone
/// or the job is cancelled the task returns without a trailer and the
/// consumer treats the closed channel as an abort.
pub fn encode_entry(
    entry: &WalkedEntry,
    cfg: &ArchiveConfig,
    cancel: &CancelFlag,
    tx: &Sender<EntryMsg>,
) {
    let file = match File::open(&entry.abs_path) {
        Ok(f) => f,
        Err(e) => {
            let _ = tx.send(EntryMsg::Done(EntryTrailer {
                crc32: 0,
                u_size: 0,
                c_size: 0,
                failure: Some(EntryFailure::Unreadable(e.to_string())),
            }));
            return;
        }
    };

    let compressor = codec::for_entry(cfg.is_store_name(&entry.rel_path));
    let mut src = ChunkedSource::new(file, cfg.chunk_size, cancel);
    let mut dst = ChannelSink::new(tx, cfg.chunk_size);

    let result = compressor.compress(&mut src, &mut dst, DEFLATE_LEVEL);
    let failure = match result {
        Ok(_) => None,
        Err(_) if cancel.is_cancelled() || dst.closed => return,
        Err(e) if src.failed => Some(EntryFailure::Read(e.to_string())),
        Err(e) => Some(EntryFailure::Encode(e.to_string())),
    };

    // Push out whatever the encoder left buffered below one chunk.
    if dst.flush_chunk().is_err() {
        return;
    }

    let _ = tx.send(EntryMsg::Done(EntryTrailer {
        crc32: src.crc.clone().finalize(),
        u_size: src.bytes_read,
        c_size: dst.bytes_sent,
        failure,
    }));
}

/// Bounded-chunk file reads with a running CRC-32 and a cancellation check
/// per chunk.
struct ChunkedSource<'a> {
    file: File,
    chunk_size: usize,
    cancel: &'a CancelFlag,
    crc: crc32fast::Hasher,
    bytes_read: u64,
    failed: bool,
}

impl<'a> ChunkedSource<'a> {
    fn new(file: File, chunk_size: usize, cancel: &'a CancelFlag) -> Self {
        Self {
            file,
            chunk_size: chunk_size.max(1),
            cancel,
            crc: crc32fast::Hasher::new(),
            bytes_read: 0,
            failed: false,
        }
    }
}

impl Read for ChunkedSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(io::Error::other("job cancelled"));
        }
        let want = buf.len().min(self.chunk_size);
        match self.file.read(&mut buf[..want]) {
            Ok(n) => {
                self.crc.update(&buf[..n]);
                self.bytes_read += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }
}

/// Accumulates encoder output into chunk-sized buffers and forwards them
/// through the bounded channel.
struct ChannelSink<'a> {
    tx: &'a Sender<EntryMsg>,
    buf: Vec<u8>,
    chunk_size: usize,
    bytes_sent: u64,
    closed: bool,
}

impl<'a> ChannelSink<'a> {
    fn new(tx: &'a Sender<EntryMsg>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            tx,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            bytes_sent: 0,
            closed: false,
        }
    }

    fn flush_chunk(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_size));
        let len = chunk.len() as u64;
        if self.tx.send(EntryMsg::Chunk(chunk)).is_err() {
            self.closed = true;
            return Err(io::Error::other("consumer gone"));
        }
        self.bytes_sent += len;
        Ok(())
    }
}

impl Write for ChannelSink<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut rest = data;
        while !rest.is_empty() {
            let room = self.chunk_size - self.buf.len();
            let take = room.min(rest.len());
            self.buf.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.buf.len() == self.chunk_size {
                self.flush_chunk()?;
            }
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
