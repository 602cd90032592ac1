use log::info;

use crate::{
    core::item::{ItemProcessor, ItemProcessorResult},
    BatchError,
};

use super::Person;

/// Upper-cases both names of a person.
///
/// A person with a blank name is rejected, which the step either fails on
/// or counts as a skip depending on its skip policy.
#[derive(Default)]
pub struct PersonItemProcessor;

impl ItemProcessor<Person, Person> for PersonItemProcessor {
    fn process(&self, person: &Person) -> ItemProcessorResult<Person> {
        if person.first_name.trim().is_empty() || person.last_name.trim().is_empty() {
            return Err(BatchError::ItemProcessor(format!(
                "person with a blank name: ({})",
                person
            )));
        }

        let transformed = Person {
            last_name: person.last_name.to_uppercase(),
            first_name: person.first_name.to_uppercase(),
        };
        info!("Converting ({}) into ({})", person, transformed);

        Ok(Some(transformed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_should_be_upper_cased() {
        let processed = PersonItemProcessor
            .process(&Person::new("Doe", "Jon"))
            .unwrap()
            .unwrap();
        assert_eq!(processed, Person::new("DOE", "JON"));
    }

    #[test]
    fn processing_twice_should_change_nothing_more() {
        let once = PersonItemProcessor
            .process(&Person::new("Smith", "Anna"))
            .unwrap()
            .unwrap();
        let twice = PersonItemProcessor.process(&once).unwrap().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn blank_name_should_be_a_processor_error() {
        let result = PersonItemProcessor.process(&Person::new("Doe", "  "));
        assert!(matches!(result, Err(BatchError::ItemProcessor(_))));
    }
}
