//! Database façade
//!
//! The entry point callers use. Every operation validates its arguments,
//! checks that the store is open, then runs one shared core routine either
//! inline (blocking form) or on the executor (callback form).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::batch::Batch;
use crate::config::Config;
use crate::cursor::{Cursor, CursorShared};
use crate::engine::{AtlasEngine, BatchOp, EngineHandle, SupportsBufferRead, SupportsBulkGet};
use crate::error::{AtlasError, Result};
use crate::executor;
use crate::options::{
    GetBufferOptions, GetOptions, IteratorOptions, MultiGetOptions, ReadOptions, WriteOptions,
};
use crate::value::Value;

enum Status<E> {
    Closed,
    Opening,
    Open(Arc<E>),
    Closing,
}

struct Shared<E: EngineHandle> {
    location: PathBuf,
    status: Mutex<Status<E>>,
    /// Cursors created on the current handle; ended on close
    cursors: Mutex<Vec<Weak<CursorShared<E::Iter>>>>,
}

/// A store at one location, opened and closed through this handle
///
/// Clones refer to the same handle.
pub struct Database<E: EngineHandle = AtlasEngine> {
    shared: Arc<Shared<E>>,
}

impl<E: EngineHandle> Clone for Database<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(AtlasError::invalid("key cannot be empty"));
    }
    Ok(())
}

// =============================================================================
// Core Routines (shared by the blocking and callback forms)
// =============================================================================

fn get_core<E: EngineHandle>(engine: &E, key: &[u8], options: GetOptions) -> Result<Value> {
    engine
        .get(key, options.fill_cache)?
        .map(|v| Value::materialize(v, options.as_buffer))
        .ok_or_else(|| AtlasError::not_found(key))
}

fn multi_get_core<E: SupportsBulkGet>(
    engine: &E,
    keys: &[Vec<u8>],
    options: MultiGetOptions,
) -> Result<Vec<Option<Value>>> {
    let values = engine.multi_get(keys, options.fill_cache)?;
    let mut out = Vec::with_capacity(if options.keys { keys.len() * 2 } else { keys.len() });

    for (key, value) in keys.iter().zip(values) {
        if value.is_none() && options.raise_error {
            return Err(AtlasError::not_found(key));
        }
        if options.keys {
            out.push(Some(Value::from(key.as_slice())));
        }
        out.push(value.map(|v| Value::materialize(v, options.as_buffer)));
    }
    Ok(out)
}

fn get_buffer_core<E: SupportsBufferRead>(
    engine: &E,
    key: &[u8],
    dest: &mut [u8],
    options: GetBufferOptions,
) -> Result<usize> {
    engine.get_into(key, &mut dest[options.offset..], options.fill_cache)
}

fn is_exists_core<E: EngineHandle>(engine: &E, key: &[u8], options: ReadOptions) -> Result<bool> {
    Ok(engine.get(key, options.fill_cache)?.is_some())
}

impl Database<AtlasEngine> {
    /// Bind a handle to `location` without opening it
    pub fn new(location: impl AsRef<Path>) -> Result<Self> {
        Self::with_location(location)
    }
}

impl<E: EngineHandle> Database<E> {
    /// Bind a handle for engine `E` to `location` without opening it
    pub fn with_location(location: impl AsRef<Path>) -> Result<Self> {
        let location = location.as_ref();
        if location.as_os_str().is_empty() {
            return Err(AtlasError::invalid("location cannot be empty"));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                location: location.to_path_buf(),
                status: Mutex::new(Status::Closed),
                cursors: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn location(&self) -> &Path {
        &self.shared.location
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.shared.status.lock(), Status::Open(_))
    }

    /// The open engine, or `Closed`
    fn engine(&self) -> Result<Arc<E>> {
        match &*self.shared.status.lock() {
            Status::Open(engine) => Ok(Arc::clone(engine)),
            _ => Err(AtlasError::Closed),
        }
    }

    /// Run `work` against the engine on the executor
    fn dispatch<T, W, C>(&self, work: W, callback: C) -> Result<()>
    where
        T: Send + 'static,
        W: FnOnce(&E) -> Result<T> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let engine = self.engine()?;
        executor::global().submit(move || work(&*engine), callback);
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn begin_open(&self) -> Result<()> {
        let mut status = self.shared.status.lock();
        match *status {
            Status::Closed => {
                *status = Status::Opening;
                Ok(())
            }
            Status::Opening | Status::Open(_) => {
                Err(AtlasError::invalid("database is already open"))
            }
            Status::Closing => Err(AtlasError::invalid("database is closing")),
        }
    }

    fn finish_open(shared: &Shared<E>, config: &Config) -> Result<()> {
        let opened = E::open(&shared.location, config);
        let mut status = shared.status.lock();
        match opened {
            Ok(engine) => {
                *status = Status::Open(Arc::new(engine));
                Ok(())
            }
            Err(e) => {
                *status = Status::Closed;
                tracing::warn!(location = %shared.location.display(), error = %e, "open failed");
                Err(e)
            }
        }
    }

    /// Open the store, creating it if `config` allows
    pub fn open(&self, config: Config) -> Result<()> {
        self.begin_open()?;
        Self::finish_open(&self.shared, &config)
    }

    pub fn open_async<F>(&self, config: Config, callback: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.begin_open()?;
        let shared = Arc::clone(&self.shared);
        executor::global().submit(move || Self::finish_open(&shared, &config), callback);
        Ok(())
    }

    fn begin_close(&self) -> Result<Arc<E>> {
        let mut status = self.shared.status.lock();
        let engine = match &*status {
            Status::Open(engine) => Arc::clone(engine),
            _ => return Err(AtlasError::Closed),
        };
        *status = Status::Closing;
        drop(status);

        let cursors = std::mem::take(&mut *self.shared.cursors.lock());
        for cursor in cursors.iter().filter_map(Weak::upgrade) {
            cursor.force_end();
        }
        Ok(engine)
    }

    fn finish_close(shared: &Shared<E>, engine: Arc<E>) -> Result<()> {
        let result = engine.close();
        *shared.status.lock() = Status::Closed;
        result
    }

    /// Close the store; live cursors are ended first
    pub fn close(&self) -> Result<()> {
        let engine = self.begin_close()?;
        Self::finish_close(&self.shared, engine)
    }

    pub fn close_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let engine = self.begin_close()?;
        let shared = Arc::clone(&self.shared);
        executor::global().submit(move || Self::finish_close(&shared, engine), callback);
        Ok(())
    }

    // =========================================================================
    // Point Operations
    // =========================================================================

    /// Value stored at `key`; `NotFound` if there is none
    pub fn get(&self, key: impl AsRef<[u8]>, options: GetOptions) -> Result<Value> {
        let key = key.as_ref();
        check_key(key)?;
        get_core(&*self.engine()?, key, options)
    }

    pub fn get_async<F>(&self, key: impl AsRef<[u8]>, options: GetOptions, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let key = key.as_ref().to_vec();
        check_key(&key)?;
        self.dispatch(move |engine| get_core(engine, &key, options), callback)
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>, options: WriteOptions) -> Result<()> {
        let key = key.as_ref();
        check_key(key)?;
        self.engine()?.put(key, value.as_ref(), options.sync)
    }

    pub fn put_async<F>(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: WriteOptions,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let key = key.as_ref().to_vec();
        check_key(&key)?;
        let value = value.as_ref().to_vec();
        self.dispatch(move |engine| engine.put(&key, &value, options.sync), callback)
    }

    pub fn del(&self, key: impl AsRef<[u8]>, options: WriteOptions) -> Result<()> {
        let key = key.as_ref();
        check_key(key)?;
        self.engine()?.delete(key, options.sync)
    }

    pub fn del_async<F>(&self, key: impl AsRef<[u8]>, options: WriteOptions, callback: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let key = key.as_ref().to_vec();
        check_key(&key)?;
        self.dispatch(move |engine| engine.delete(&key, options.sync), callback)
    }

    /// True if `key` holds a value
    pub fn is_exists(&self, key: impl AsRef<[u8]>, options: ReadOptions) -> Result<bool> {
        let key = key.as_ref();
        check_key(key)?;
        is_exists_core(&*self.engine()?, key, options)
    }

    pub fn is_exists_async<F>(&self, key: impl AsRef<[u8]>, options: ReadOptions, callback: F) -> Result<()>
    where
        F: FnOnce(Result<bool>) + Send + 'static,
    {
        let key = key.as_ref().to_vec();
        check_key(&key)?;
        self.dispatch(move |engine| is_exists_core(engine, &key, options), callback)
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Apply `ops` atomically; an empty list is a no-op
    pub fn batch(&self, ops: Vec<BatchOp>, options: WriteOptions) -> Result<()> {
        ops.iter().try_for_each(|op| check_key(op.key()))?;
        self.engine()?.write_batch(ops, options.sync)
    }

    pub fn batch_async<F>(&self, ops: Vec<BatchOp>, options: WriteOptions, callback: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        ops.iter().try_for_each(|op| check_key(op.key()))?;
        self.dispatch(move |engine| engine.write_batch(ops, options.sync), callback)
    }

    /// Start an empty batch builder bound to this handle
    pub fn chained_batch(&self) -> Batch<E> {
        Batch::new(self.clone())
    }

    // =========================================================================
    // Ranges and Introspection
    // =========================================================================

    /// Create a cursor over a snapshot of the store
    pub fn iterator(&self, options: IteratorOptions) -> Result<Cursor<E>> {
        let native = self.engine()?.iterator(options.to_range())?;
        let cursor = Cursor::new(native, &options);

        let mut cursors = self.shared.cursors.lock();
        cursors.retain(|c| c.strong_count() > 0);
        cursors.push(Arc::downgrade(cursor.shared()));
        Ok(cursor)
    }

    /// Approximate on-disk bytes for keys in `[start, end]`
    pub fn approximate_size(&self, start: impl AsRef<[u8]>, end: impl AsRef<[u8]>) -> Result<u64> {
        self.engine()?.approximate_size(start.as_ref(), end.as_ref())
    }

    pub fn approximate_size_async<F>(
        &self,
        start: impl AsRef<[u8]>,
        end: impl AsRef<[u8]>,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Result<u64>) + Send + 'static,
    {
        let (start, end) = (start.as_ref().to_vec(), end.as_ref().to_vec());
        self.dispatch(move |engine| engine.approximate_size(&start, &end), callback)
    }

    /// Engine property; unknown names give an empty string
    pub fn get_property(&self, name: &str) -> Result<String> {
        Ok(self.engine()?.property(name))
    }
}

// =============================================================================
// Capability-gated Operations
// =============================================================================

impl<E: SupportsBulkGet> Database<E> {
    /// Look up many keys at once
    ///
    /// The result is flattened: `[key, value, key, value, ...]` with
    /// `keys` set, values only otherwise. Keys come back as buffers. A
    /// missing key fails the call when `raise_error` is set, otherwise its
    /// value slot is `None`.
    pub fn multi_get<K: AsRef<[u8]>>(&self, keys: &[K], options: MultiGetOptions) -> Result<Vec<Option<Value>>> {
        let keys = owned_keys(keys)?;
        multi_get_core(&*self.engine()?, &keys, options)
    }

    pub fn multi_get_async<K, F>(&self, keys: &[K], options: MultiGetOptions, callback: F) -> Result<()>
    where
        K: AsRef<[u8]>,
        F: FnOnce(Result<Vec<Option<Value>>>) + Send + 'static,
    {
        let keys = owned_keys(keys)?;
        self.dispatch(move |engine| multi_get_core(engine, &keys, options), callback)
    }
}

fn owned_keys<K: AsRef<[u8]>>(keys: &[K]) -> Result<Vec<Vec<u8>>> {
    keys.iter()
        .map(|k| {
            check_key(k.as_ref())?;
            Ok(k.as_ref().to_vec())
        })
        .collect()
}

fn check_offset(dest_len: usize, offset: usize) -> Result<()> {
    if offset > dest_len {
        return Err(AtlasError::invalid(format!(
            "offset {} is past the end of a {} byte buffer",
            offset, dest_len
        )));
    }
    Ok(())
}

impl<E: SupportsBufferRead> Database<E> {
    /// Copy the value of `key` into `dest` at `options.offset`
    ///
    /// Returns the number of bytes written.
    pub fn get_buffer(&self, key: impl AsRef<[u8]>, dest: &mut [u8], options: GetBufferOptions) -> Result<usize> {
        let key = key.as_ref();
        check_key(key)?;
        check_offset(dest.len(), options.offset)?;
        get_buffer_core(&*self.engine()?, key, dest, options)
    }

    /// Callback form of [`get_buffer`](Database::get_buffer)
    ///
    /// The buffer travels to the worker and is handed back with the result.
    pub fn get_buffer_async<F>(
        &self,
        key: impl AsRef<[u8]>,
        dest: BytesMut,
        options: GetBufferOptions,
        callback: F,
    ) -> Result<()>
    where
        F: FnOnce(Result<usize>, BytesMut) + Send + 'static,
    {
        let key = key.as_ref().to_vec();
        check_key(&key)?;
        check_offset(dest.len(), options.offset)?;
        let engine = self.engine()?;

        let mut dest = dest;
        executor::global().submit(
            move || {
                let written = get_buffer_core(&*engine, &key, &mut dest, options);
                Ok((written, dest))
            },
            move |result: Result<(Result<usize>, BytesMut)>| match result {
                Ok((written, dest)) => callback(written, dest),
                Err(e) => callback(Err(e), BytesMut::new()),
            },
        );
        Ok(())
    }
}
