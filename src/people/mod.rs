//! The people import job: `lastName,firstName` rows upper-cased and fanned
//! out to a SQL table, a flat file and an XML document.

mod job;
mod listener;
mod person;
mod processor;

pub use job::{create_table, with_import_user_job, ImportResources};
pub use listener::PeopleVerificationListener;
pub use person::{Person, PersonBinder};
pub use processor::PersonItemProcessor;
