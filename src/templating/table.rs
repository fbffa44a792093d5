//! The keyed hand-over table for captured objects.
//!
//! Objects without an immediate-operand representation are inserted here at expansion time
//! and taken out exactly once by the generated accessor the first time it runs. One mutex
//! guards both directions; keys come from a process-wide counter and are never reused.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, OnceLock,
};

use rustc_hash::FxHashMap;

use crate::{templating::capture::CapturedObject, Error, Result};

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);
static GLOBAL: OnceLock<CaptureTable> = OnceLock::new();

/// Captured objects waiting for their accessor.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotemit::{
///     metadata::{CilType, Token},
///     templating::{CaptureTable, CapturedObject},
/// };
///
/// let table = CaptureTable::new();
/// let ty = Arc::new(CilType::new(Token::new(0x0200_0002), "Demo", "Payload", "Demo"));
///
/// let key = CaptureTable::next_key();
/// table.insert(key, CapturedObject::new(ty, 42u32))?;
/// assert!(table.contains(key)?);
///
/// let object = table.take(key)?;
/// assert_eq!(object.downcast_ref::<u32>(), Some(&42));
/// assert!(table.take(key).is_err());
/// # Ok::<(), dotemit::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct CaptureTable {
    entries: Mutex<FxHashMap<u64, CapturedObject>>,
}

impl CaptureTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        CaptureTable::default()
    }

    /// The process-wide table generated accessors read from by default.
    pub fn global() -> &'static CaptureTable {
        GLOBAL.get_or_init(CaptureTable::new)
    }

    /// A key that has never been handed out before in this process.
    pub fn next_key() -> u64 {
        NEXT_KEY.fetch_add(1, Ordering::Relaxed)
    }

    /// Park an object under `key`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CaptureKeyCollision`] if the key is occupied, or
    /// [`crate::Error::LockError`] if the table lock is poisoned.
    pub fn insert(&self, key: u64, object: CapturedObject) -> Result<()> {
        let mut entries = lock!(self.entries)?;
        if entries.contains_key(&key) {
            return Err(Error::CaptureKeyCollision(key));
        }
        entries.insert(key, object);
        Ok(())
    }

    /// Remove and return the object parked under `key`.
    ///
    /// # Errors
    /// Returns [`crate::Error::CaptureKeyMissing`] if nothing (or nothing anymore) is stored
    /// under the key, or [`crate::Error::LockError`] if the table lock is poisoned.
    pub fn take(&self, key: u64) -> Result<CapturedObject> {
        lock!(self.entries)?
            .remove(&key)
            .ok_or(Error::CaptureKeyMissing(key))
    }

    /// Returns `true` if an object is parked under `key`.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the table lock is poisoned.
    pub fn contains(&self, key: u64) -> Result<bool> {
        with_lock!(self.entries, |entries: &mut FxHashMap<u64, CapturedObject>| entries
            .contains_key(&key))
    }

    /// Number of parked objects.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the table lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        with_lock!(self.entries, |entries: &mut FxHashMap<u64, CapturedObject>| entries.len())
    }

    /// Returns `true` if nothing is parked.
    ///
    /// # Errors
    /// Returns [`crate::Error::LockError`] if the table lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
