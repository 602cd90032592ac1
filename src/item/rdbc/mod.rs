use std::future::Future;

use sqlx::{query_builder::Separated, Database};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::BatchError;

pub mod sqlite_writer;

/// Trait for binding item data to database query parameters.
///
/// Binders push owned values, one `push_bind` per column and in the same
/// order as the columns declared on the writer.
///
/// # Examples
///
/// ```no_run
/// use batch_pipeline::item::rdbc::DatabaseItemBinder;
/// use sqlx::{query_builder::Separated, Sqlite};
///
/// struct User {
///     id: i32,
///     name: String,
/// }
///
/// struct UserBinder;
/// impl DatabaseItemBinder<User, Sqlite> for UserBinder {
///     fn bind(&self, item: &User, mut query_builder: Separated<Sqlite, &str>) {
///         query_builder.push_bind(item.id);
///         query_builder.push_bind(item.name.clone());
///     }
/// }
/// ```
pub trait DatabaseItemBinder<O, DB: Database>: Sync {
    /// Binds the properties of an item to a separated query builder.
    fn bind(&self, item: &O, query_builder: Separated<DB, &str>);
}

/// Drives `future` to completion from synchronous step code.
///
/// Inside a multi-threaded runtime the current worker is handed over with
/// `block_in_place`; outside any runtime the future runs on `handle`. A
/// current-thread runtime cannot be blocked from within and is refused.
pub(crate) fn block_on<F: Future>(handle: &Handle, future: F) -> Result<F::Output, BatchError> {
    match Handle::try_current() {
        Ok(current) => match current.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                Ok(tokio::task::block_in_place(|| current.block_on(future)))
            }
            flavor => Err(BatchError::ItemWriter(format!(
                "cannot wait for the database from a {:?} tokio runtime, \
                 use a multi-threaded runtime or call from outside of it",
                flavor
            ))),
        },
        Err(_) => Ok(handle.block_on(future)),
    }
}

pub use sqlite_writer::{SqliteItemWriter, SqliteItemWriterBuilder};
