//! Cursors
//!
//! Client side of range iteration. A cursor pulls pages from its engine
//! iterator and hands entries out one at a time.
//!
//! ## States
//! ```text
//! Created ──next──▶ Active ──engine done, buffer drained──▶ Exhausted
//!    │                 │                                       │
//!    └───────end───────┴──────────────────end──────────────────┴──▶ Ended
//! ```
//!
//! The blocking and callback paths share [`CursorInner::deliver`] and
//! [`CursorInner::load`]; they differ only in where the page fetch runs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{AtlasEngine, EngineHandle, NativeIterator, Page};
use crate::error::{AtlasError, Result};
use crate::executor;
use crate::options::IteratorOptions;
use crate::value::Value;

/// One key/value pair
pub type Entry = (Value, Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No `next` call yet
    Created,
    Active,
    /// Every entry has been handed out
    Exhausted,
    /// `end` was called; the engine iterator is released
    Ended,
}

enum Step {
    Ready(Option<Entry>),
    Fetch,
}

pub(crate) struct CursorInner<I> {
    /// Taken out while a background fetch holds it
    native: Option<I>,
    state: CursorState,
    /// Flattened key, value, key, value... of the current page
    page: Vec<Value>,
    /// Index of the next key to hand out
    pos: usize,
    /// Engine reported nothing beyond the current page
    finished: bool,
    fetching: bool,
    /// Set when a page fetch failed; later calls report it
    failed: Option<String>,
    key_as_buffer: bool,
    value_as_buffer: bool,
    high_water_mark: usize,
}

impl<I: NativeIterator> CursorInner<I> {
    fn check_usable(&self) -> Result<()> {
        if self.state == CursorState::Ended {
            return Err(AtlasError::IteratorClosed);
        }
        if let Some(reason) = &self.failed {
            return Err(AtlasError::Storage(reason.clone()));
        }
        if self.fetching {
            return Err(AtlasError::invalid(
                "cannot call next() before previous next() has completed",
            ));
        }
        Ok(())
    }

    /// Serve from the buffer, or say a fetch is needed
    fn deliver(&mut self) -> Step {
        if self.pos + 1 < self.page.len() {
            let key = std::mem::take(&mut self.page[self.pos]);
            let value = std::mem::take(&mut self.page[self.pos + 1]);
            self.pos += 2;
            self.state = CursorState::Active;
            return Step::Ready(Some((key, value)));
        }
        if self.finished {
            self.state = CursorState::Exhausted;
            return Step::Ready(None);
        }
        Step::Fetch
    }

    /// Install a fetched page and serve its first entry
    fn load(&mut self, page: Result<Page>) -> Result<Option<Entry>> {
        let page = page?;
        self.finished = page.finished;
        self.page.clear();
        self.pos = 0;

        let mut entries = page.entries.into_iter();
        while let (Some(key), Some(value)) = (entries.next(), entries.next()) {
            self.page.push(Value::materialize(key, self.key_as_buffer));
            self.page.push(Value::materialize(value, self.value_as_buffer));
        }

        match self.deliver() {
            Step::Ready(entry) => Ok(entry),
            // an unfinished page always carries an entry
            Step::Fetch => Err(AtlasError::Storage(
                "engine returned an empty page before the end of the range".to_string(),
            )),
        }
    }

    fn take_native(&mut self) -> Result<I> {
        self.native.take().ok_or_else(|| {
            AtlasError::Storage(self.fail("engine iterator lost after a failed fetch".to_string()))
        })
    }

    /// Record a fetch failure and return its message
    fn fail(&mut self, reason: String) -> String {
        self.page.clear();
        self.pos = 0;
        self.failed = Some(reason.clone());
        reason
    }

    /// Release the engine iterator; false if already ended
    fn release(&mut self) -> bool {
        if self.state == CursorState::Ended {
            return false;
        }
        self.state = CursorState::Ended;
        self.page.clear();
        self.pos = 0;
        if let Some(mut native) = self.native.take() {
            native.release();
        }
        true
    }
}

pub(crate) struct CursorShared<I> {
    inner: Mutex<CursorInner<I>>,
}

impl<I: NativeIterator> CursorShared<I> {
    /// End the cursor if it is still live (used when the database closes)
    pub(crate) fn force_end(&self) {
        if self.inner.lock().release() {
            tracing::debug!("cursor ended by database close");
        }
    }
}

/// Iterator over a key range of an open [`Database`](crate::Database)
///
/// Clones share the same position. A cursor must not have two `next`
/// calls in flight at once.
pub struct Cursor<E: EngineHandle = AtlasEngine> {
    shared: Arc<CursorShared<E::Iter>>,
}

impl<E: EngineHandle> Clone for Cursor<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: EngineHandle> Cursor<E> {
    pub(crate) fn new(native: E::Iter, options: &IteratorOptions) -> Self {
        let inner = CursorInner {
            native: Some(native),
            state: CursorState::Created,
            page: Vec::new(),
            pos: 0,
            finished: false,
            fetching: false,
            failed: None,
            key_as_buffer: options.key_as_buffer,
            value_as_buffer: options.value_as_buffer,
            high_water_mark: options.high_water_mark,
        };
        Self {
            shared: Arc::new(CursorShared {
                inner: Mutex::new(inner),
            }),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<CursorShared<E::Iter>> {
        &self.shared
    }

    pub fn state(&self) -> CursorState {
        self.shared.inner.lock().state
    }

    /// Next entry, blocking for a page fetch when the buffer is empty
    ///
    /// `Ok(None)` once the range is exhausted, on every later call too.
    pub fn next(&self) -> Result<Option<Entry>> {
        let mut inner = self.shared.inner.lock();
        inner.check_usable()?;

        match inner.deliver() {
            Step::Ready(entry) => Ok(entry),
            Step::Fetch => {
                let mut native = inner.take_native()?;
                let page = native.next_page(inner.high_water_mark);
                inner.native = Some(native);
                inner.load(page)
            }
        }
    }

    /// Callback form of [`next`](Cursor::next)
    ///
    /// The callback always runs on the completion thread, even when the
    /// entry was already buffered.
    pub fn next_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Option<Entry>>) + Send + 'static,
    {
        let mut inner = self.shared.inner.lock();
        inner.check_usable()?;

        match inner.deliver() {
            Step::Ready(entry) => {
                drop(inner);
                executor::global().complete(move || callback(Ok(entry)));
            }
            Step::Fetch => {
                let mut native = match inner.take_native() {
                    Ok(native) => native,
                    Err(e) => {
                        drop(inner);
                        executor::global().complete(move || callback(Err(e)));
                        return Ok(());
                    }
                };
                inner.fetching = true;
                let high_water_mark = inner.high_water_mark;
                drop(inner);

                let shared = Arc::clone(&self.shared);
                executor::global().submit(
                    move || {
                        let page = native.next_page(high_water_mark);
                        Ok((native, page))
                    },
                    move |fetched| {
                        let mut inner = shared.inner.lock();
                        inner.fetching = false;
                        let outcome = match fetched {
                            Ok((mut native, page)) => {
                                if inner.state == CursorState::Ended {
                                    native.release();
                                    Err(AtlasError::IteratorClosed)
                                } else {
                                    inner.native = Some(native);
                                    inner.load(page)
                                }
                            }
                            Err(e) => {
                                let reason = inner.fail(format!("page fetch failed: {}", e));
                                Err(AtlasError::Storage(reason))
                            }
                        };
                        drop(inner);
                        callback(outcome);
                    },
                );
            }
        }
        Ok(())
    }

    /// Reposition at the first entry at or past `target` in range order
    ///
    /// Buffered entries are dropped. A target outside the range leaves the
    /// cursor with nothing more to yield.
    pub fn seek(&self, target: impl AsRef<[u8]>) -> Result<()> {
        let mut inner = self.shared.inner.lock();
        inner.check_usable()?;

        let target = target.as_ref();
        match inner.native.as_mut() {
            Some(native) => native.seek(target),
            None => return Err(AtlasError::Storage("engine iterator lost after a failed fetch".to_string())),
        }
        inner.page.clear();
        inner.pos = 0;
        inner.finished = false;
        if inner.state == CursorState::Exhausted {
            inner.state = CursorState::Active;
        }
        Ok(())
    }

    /// Release the engine iterator
    ///
    /// A second call fails with `IteratorClosed`.
    pub fn end(&self) -> Result<()> {
        if !self.shared.inner.lock().release() {
            return Err(AtlasError::IteratorClosed);
        }
        tracing::debug!("cursor ended");
        Ok(())
    }

    /// Callback form of [`end`](Cursor::end)
    pub fn end_async<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        self.end()?;
        executor::global().complete(move || callback(Ok(())));
        Ok(())
    }
}
