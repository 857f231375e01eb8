//! Append-only on-disk journal of pooled transactions.
//!
//! The file is a sequence of `[u32-le length][bincode Transaction]`
//! records. Rotation rewrites it from a snapshot of the pool and replaces
//! the old file atomically with a rename.

use {
    crate::error::{Result, TxPoolError},
    log::{debug, info, warn},
    ranger_primitives::Address,
    ranger_transaction::Transaction,
    std::{
        collections::HashMap,
        fs::{self, File, OpenOptions},
        io::{self, BufReader, BufWriter, ErrorKind, Read, Write},
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// Transactions are replayed into the pool in batches of this size.
const LOAD_BATCH_SIZE: usize = 1024;

/// Records above this size are treated as corruption.
const MAX_RECORD_SIZE: u32 = 4 * 1024 * 1024;

pub struct TxJournal {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl TxJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay the journal through `add`, which receives batches of decoded
    /// transactions and returns how many of them it rejected.
    ///
    /// A missing file is an empty journal. A truncated or undecodable
    /// record stops the replay with [`TxPoolError::JournalCorrupted`].
    pub fn load(&mut self, mut add: impl FnMut(Vec<Transaction>) -> usize) -> Result<usize> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        // Appends go to the rotated file, never to the one being read.
        self.writer = None;

        let mut reader = BufReader::new(file);
        let mut offset = 0u64;
        let mut total = 0usize;
        let mut dropped = 0usize;
        let mut batch = Vec::with_capacity(LOAD_BATCH_SIZE);
        while let Some(tx) = read_record(&mut reader, &mut offset)? {
            total = total.saturating_add(1);
            batch.push(tx);
            if batch.len() >= LOAD_BATCH_SIZE {
                dropped = dropped.saturating_add(add(std::mem::take(&mut batch)));
            }
        }
        if !batch.is_empty() {
            dropped = dropped.saturating_add(add(batch));
        }
        info!(
            "Loaded bridge transaction journal {}: {total} transactions, {dropped} dropped",
            self.path.display()
        );
        Ok(total)
    }

    /// Append one transaction to the active journal.
    pub fn insert(&mut self, tx: &Transaction) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TxPoolError::NoActiveJournal)?;
        write_record(writer, tx)?;
        writer.flush()?;
        Ok(())
    }

    /// Rewrite the journal so it holds exactly `all`, then reopen it for
    /// appending.
    pub fn rotate(&mut self, all: &HashMap<Address, Vec<Arc<Transaction>>>) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        let tmp = self.path.with_extension("new");
        let mut count = 0usize;
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for tx in all.values().flatten() {
                write_record(&mut writer, tx)?;
                count = count.saturating_add(1);
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        debug!(
            "Regenerated bridge transaction journal {}: {count} transactions, {} accounts",
            self.path.display(),
            all.len()
        );
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for TxJournal {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("Failed to close journal {}: {err}", self.path.display());
        }
    }
}

fn write_record(writer: &mut impl Write, tx: &Transaction) -> io::Result<()> {
    let bytes = tx.encode();
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "transaction too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&bytes)
}

fn read_record(reader: &mut impl Read, offset: &mut u64) -> Result<Option<Transaction>> {
    let mut len_buf = [0u8; 4];
    match read_full(reader, &mut len_buf)? {
        0 => return Ok(None),
        4 => {}
        _ => return Err(corrupted(*offset, "truncated record length")),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_RECORD_SIZE {
        return Err(corrupted(*offset, format!("record of {len} bytes")));
    }
    let mut body = vec![0u8; len as usize];
    if read_full(reader, &mut body)? != body.len() {
        return Err(corrupted(*offset, "truncated record"));
    }
    let tx = Transaction::decode(&body).map_err(|err| corrupted(*offset, err.to_string()))?;
    *offset = offset.saturating_add(4).saturating_add(u64::from(len));
    Ok(Some(tx))
}

/// Fill `buf` as far as the reader allows; returns the bytes read.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read = read.saturating_add(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(read)
}

fn corrupted(offset: u64, reason: impl Into<String>) -> TxPoolError {
    TxPoolError::JournalCorrupted {
        offset,
        reason: reason.into(),
    }
}
