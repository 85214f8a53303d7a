#![forbid(unsafe_code)]

use std::{io, path::Path, thread, time::Duration};

use crate::{DbError, KvStore, Result};

const OPEN_LOCK_RETRIES: u32 = 50;
const OPEN_LOCK_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Clone)]
pub struct SledKv {
    db: sled::Db,
}

fn lock_held(err: &sled::Error) -> bool {
    matches!(err, sled::Error::Io(e) if e.kind() == io::ErrorKind::WouldBlock)
}

impl SledKv {
    /// Opens the database at `path`. A previous handle's background flusher
    /// may still hold the file lock for a moment after drop, so a held lock
    /// is retried with a short backoff.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut attempt = 0;
        loop {
            match sled::open(path) {
                Ok(db) => return Ok(Self { db }),
                Err(e) if lock_held(&e) && attempt < OPEN_LOCK_RETRIES => {
                    attempt += 1;
                    thread::sleep(OPEN_LOCK_BACKOFF);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Flushes and drops this handle.
    pub fn close(self) -> Result<()> {
        self.flush()
    }
}

impl KvStore for SledKv {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self.db.get(key)? {
            Some(v) => Ok(v.to_vec()),
            None => Err(DbError::NotFound),
        }
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.db.insert(key, value)?;
        self.db.flush()?;
        Ok(())
    }

    fn del(&self, key: &[u8]) -> Result<()> {
        let _ = self.db.remove(key)?;
        self.db.flush()?;
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.db.contains_key(key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (k, v) = item?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }
}
