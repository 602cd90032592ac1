use std::time::Duration;

use log::{debug, error};
use sqlx::{Pool, QueryBuilder, Sqlite};
use tokio::runtime::Handle;

use crate::core::item::{ItemWriter, ItemWriterResult};
use crate::item::rdbc::{block_on, DatabaseItemBinder};
use crate::BatchError;

// SQLITE_MAX_VARIABLE_NUMBER default since SQLite 3.32
const BIND_LIMIT: usize = 32766;

/// A writer for inserting items into a SQLite table using SQLx.
///
/// Each call to `write` inserts the whole chunk inside one transaction:
/// either every row of the chunk is committed or none is. Chunks larger
/// than the bind parameter limit are split into several `INSERT`
/// statements within that transaction.
///
/// The writer is synchronous. When called from a multi-threaded tokio
/// runtime it blocks in place; otherwise it runs the insert on the
/// runtime handle given to the builder.
pub struct SqliteItemWriter<'a, O> {
    pool: &'a Pool<Sqlite>,
    table: &'a str,
    columns: Vec<&'a str>,
    item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>,
    handle: Handle,
    timeout: Option<Duration>,
}

impl<O> SqliteItemWriter<'_, O> {
    async fn insert(&self, items: &[O]) -> Result<(), sqlx::Error> {
        let mut transaction = self.pool.begin().await?;

        for batch in items.chunks(BIND_LIMIT / self.columns.len()) {
            let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new("INSERT INTO ");
            query_builder.push(self.table);
            query_builder.push(" (");
            query_builder.push(self.columns.join(","));
            query_builder.push(") ");

            query_builder.push_values(batch, |b, item| {
                self.item_binder.bind(item, b);
            });

            query_builder.build().execute(&mut *transaction).await?;
        }

        transaction.commit().await
    }

    async fn insert_with_timeout(&self, items: &[O]) -> Result<(), String> {
        match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.insert(items)).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {} ms", timeout.as_millis())),
            },
            None => self.insert(items).await.map_err(|e| e.to_string()),
        }
    }
}

impl<O> ItemWriter<O> for SqliteItemWriter<'_, O> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        if items.is_empty() {
            return Ok(());
        }

        match block_on(&self.handle, self.insert_with_timeout(items))? {
            Ok(()) => {
                debug!(
                    "Successfully wrote {} items to SQLite table {}",
                    items.len(),
                    self.table
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to write items to SQLite table {}: {}",
                    self.table, e
                );
                Err(BatchError::ItemWriter(format!("SQLite write failed: {}", e)))
            }
        }
    }
}

/// Builder for [`SqliteItemWriter`].
///
/// # Examples
///
/// ```no_run
/// use batch_pipeline::item::rdbc::{DatabaseItemBinder, SqliteItemWriterBuilder};
/// use sqlx::{query_builder::Separated, Sqlite, SqlitePool};
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
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = SqlitePool::connect("sqlite://database.db").await?;
/// let binder = UserBinder;
///
/// let writer = SqliteItemWriterBuilder::<User>::new()
///     .pool(&pool)
///     .table("users")
///     .add_column("id")
///     .add_column("name")
///     .item_binder(&binder)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteItemWriterBuilder<'a, O> {
    pool: Option<&'a Pool<Sqlite>>,
    table: Option<&'a str>,
    columns: Vec<&'a str>,
    item_binder: Option<&'a dyn DatabaseItemBinder<O, Sqlite>>,
    handle: Option<Handle>,
    timeout: Option<Duration>,
}

impl<O> Default for SqliteItemWriterBuilder<'_, O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, O> SqliteItemWriterBuilder<'a, O> {
    pub fn new() -> Self {
        Self {
            pool: None,
            table: None,
            columns: Vec::new(),
            item_binder: None,
            handle: None,
            timeout: None,
        }
    }

    pub fn pool(mut self, pool: &'a Pool<Sqlite>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn table(mut self, table: &'a str) -> Self {
        self.table = Some(table);
        self
    }

    /// Adds a column, in the order the binder pushes its values.
    pub fn add_column(mut self, column: &'a str) -> Self {
        self.columns.push(column);
        self
    }

    pub fn item_binder(mut self, item_binder: &'a dyn DatabaseItemBinder<O, Sqlite>) -> Self {
        self.item_binder = Some(item_binder);
        self
    }

    /// Runtime used when `write` is called outside of any tokio context.
    ///
    /// Defaults to the runtime current at `build` time.
    pub fn handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Bounds the duration of each chunk insert.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<SqliteItemWriter<'a, O>, BatchError> {
        let missing = |what: &str| BatchError::Configuration(format!("SQLite writer needs {}", what));

        let pool = self.pool.ok_or_else(|| missing("a pool"))?;
        let table = self.table.ok_or_else(|| missing("a table"))?;
        let item_binder = self.item_binder.ok_or_else(|| missing("an item binder"))?;
        if self.columns.is_empty() {
            return Err(missing("at least one column"));
        }
        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| missing("a runtime handle"))?,
        };

        Ok(SqliteItemWriter {
            pool,
            table,
            columns: self.columns,
            item_binder,
            handle,
            timeout: self.timeout,
        })
    }
}
