use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, Sqlite};

use crate::item::rdbc::DatabaseItemBinder;

/// One row of the people file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub last_name: String,
    pub first_name: String,
}

impl Person {
    pub fn new(last_name: &str, first_name: &str) -> Self {
        Self {
            last_name: last_name.to_string(),
            first_name: first_name.to_string(),
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "firstName: {}, lastName: {}", self.first_name, self.last_name)
    }
}

/// Binds `first_name, last_name`, in that column order.
#[derive(Default)]
pub struct PersonBinder;

impl PersonBinder {
    pub const COLUMNS: [&'static str; 2] = ["first_name", "last_name"];
}

impl DatabaseItemBinder<Person, Sqlite> for PersonBinder {
    fn bind(&self, item: &Person, mut query_builder: Separated<Sqlite, &str>) {
        query_builder.push_bind(item.first_name.clone());
        query_builder.push_bind(item.last_name.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::Person;

    #[test]
    fn display_should_read_first_name_first() {
        let person = Person::new("Doe", "Jon");
        assert_eq!(person.to_string(), "firstName: Jon, lastName: Doe");
    }

    #[test]
    fn serde_names_should_be_camel_case() {
        let json = serde_json::to_string(&Person::new("Doe", "Jon")).unwrap();
        assert_eq!(json, r#"{"lastName":"Doe","firstName":"Jon"}"#);
    }
}
