use tracing::debug;

use crate::error::StoreError;
use crate::traits::{RecordStore, RecordTxn};

/// Run `f` inside a transaction on `store`.
///
/// Commits when `f` returns `Ok`. On `Err`, or if `f` panics, the
/// transaction is dropped uncommitted and its writes are discarded.
pub fn with_transaction<S, T, E, F>(store: &S, f: F) -> Result<T, E>
where
    S: RecordStore + ?Sized,
    E: From<StoreError>,
    F: FnOnce(&mut dyn RecordTxn) -> Result<T, E>,
{
    let mut txn = store.begin()?;
    match f(txn.as_mut()) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(err) => {
            debug!("transaction rolled back");
            drop(txn);
            Err(err)
        }
    }
}
