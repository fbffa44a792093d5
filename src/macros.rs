#![allow(unused_macros)]

/// Helper macro for locking items, mapping a poisoned lock to [`crate::Error::LockError`]
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex)?;
///  data.some_field = 42;
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for running a closure on locked items
///
/// ```rust, ignore
///  let count = with_lock!(table, |entries| entries.len())?;
/// ```
macro_rules! with_lock {
    ($lock:expr, $closure:expr) => {{
        match $lock.lock() {
            Ok(mut guard) => Ok($closure(&mut *guard)),
            Err(_) => Err(crate::Error::LockError),
        }
    }};
}
