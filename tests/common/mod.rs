#![allow(dead_code)]

mod mocks;

use std::{fs, path::Path};

pub use mocks::MockFile;

use batch_pipeline::config::{BatchConfig, Sink, StepConfig};

/// Writes a header-less `lastName,firstName` file.
pub fn write_people(path: &Path, rows: &[(&str, &str)]) {
    let content: String = rows
        .iter()
        .map(|(last_name, first_name)| format!("{},{}\n", last_name, first_name))
        .collect();
    fs::write(path, content).unwrap();
}

/// The tutorial job with every file under `dir`.
pub fn config_in(dir: &Path) -> BatchConfig {
    let mut config = BatchConfig::default();
    config.input.path = dir.join("sample-data.csv");
    config.flat_file.path = dir.join("new file.csv");
    config.xml.path = dir.join("students.xml");
    config
}

pub fn steps(steps: &[(&str, &[Sink])]) -> Vec<StepConfig> {
    steps
        .iter()
        .map(|(name, sinks)| StepConfig::new(name, sinks))
        .collect()
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
