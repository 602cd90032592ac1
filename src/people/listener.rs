use log::{error, info};
use sqlx::SqlitePool;
use tokio::runtime::Handle;

use crate::{
    core::{job::JobExecution, listener::JobCompletionListener, BatchStatus},
    item::rdbc::block_on,
    BatchError,
};

use super::Person;

/// Lists the imported people once a run completed.
pub struct PeopleVerificationListener<'a> {
    pool: &'a SqlitePool,
    table: &'a str,
    handle: Handle,
}

impl<'a> PeopleVerificationListener<'a> {
    pub fn new(pool: &'a SqlitePool, table: &'a str, handle: Handle) -> Self {
        Self {
            pool,
            table,
            handle,
        }
    }

    /// Every person of the table, in insertion order.
    pub fn people(&self) -> Result<Vec<Person>, BatchError> {
        let statement = format!(
            "SELECT first_name, last_name FROM {} ORDER BY person_id",
            self.table
        );
        let rows = block_on(&self.handle, async {
            sqlx::query_as::<_, (String, String)>(&statement)
                .fetch_all(self.pool)
                .await
        })?
        .map_err(|error| BatchError::ItemWriter(format!("unable to list people: {}", error)))?;

        Ok(rows
            .into_iter()
            .map(|(first_name, last_name)| Person {
                last_name,
                first_name,
            })
            .collect())
    }
}

impl JobCompletionListener for PeopleVerificationListener<'_> {
    fn on_complete(&self, execution: &JobExecution) {
        if execution.status != BatchStatus::Completed {
            return;
        }

        info!("!!! Job finished! Time to verify the results");
        match self.people() {
            Ok(people) => people
                .iter()
                .for_each(|person| info!("Found <{}> in the database.", person)),
            Err(error) => error!("{}", error),
        }
    }
}
