//! Chained batch builder
//!
//! Collects puts and deletes in call order, then commits them through the
//! owning database as one atomic write. A batch can be written once.

use crate::db::{check_key, Database};
use crate::engine::{AtlasEngine, BatchOp, EngineHandle};
use crate::error::{AtlasError, Result};
use crate::options::WriteOptions;

pub struct Batch<E: EngineHandle = AtlasEngine> {
    db: Database<E>,
    ops: Vec<BatchOp>,
    written: bool,
}

impl<E: EngineHandle> Batch<E> {
    pub(crate) fn new(db: Database<E>) -> Self {
        Self {
            db,
            ops: Vec::new(),
            written: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.written {
            return Err(AtlasError::BatchClosed);
        }
        Ok(())
    }

    /// Queue a put
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<&mut Self> {
        self.check_open()?;
        check_key(key.as_ref())?;
        self.ops.push(BatchOp::Put {
            key: key.as_ref().to_vec(),
            value: value.as_ref().to_vec(),
        });
        Ok(self)
    }

    /// Queue a delete
    pub fn del(&mut self, key: impl AsRef<[u8]>) -> Result<&mut Self> {
        self.check_open()?;
        check_key(key.as_ref())?;
        self.ops.push(BatchOp::Del {
            key: key.as_ref().to_vec(),
        });
        Ok(self)
    }

    /// Drop every queued operation
    pub fn clear(&mut self) -> Result<&mut Self> {
        self.check_open()?;
        self.ops.clear();
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Queued operations in apply order
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Commit every queued operation atomically
    pub fn write(&mut self, options: WriteOptions) -> Result<()> {
        self.check_open()?;
        if !self.db.is_open() {
            return Err(AtlasError::Closed);
        }
        self.written = true;
        self.db.batch(std::mem::take(&mut self.ops), options)
    }

    pub fn write_async<F>(&mut self, options: WriteOptions, callback: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.check_open()?;
        if !self.db.is_open() {
            return Err(AtlasError::Closed);
        }
        self.written = true;
        self.db
            .batch_async(std::mem::take(&mut self.ops), options, callback)
    }
}
