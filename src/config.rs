use std::{collections::HashSet, fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{core::item::SkipPolicy, BatchError};

/// Settings of the people import job, usually read from a TOML file.
///
/// Every section is optional; a missing value takes the default of the
/// tutorial job: a header-less `sample-data.csv` imported in chunks of 5
/// by three steps, one per sink.
///
/// ```
/// use batch_pipeline::config::{BatchConfig, Sink};
///
/// let config = BatchConfig::parse(r#"
///     job_name = "nightlyImport"
///
///     [chunk]
///     size = 50
///     skip_policy = { skip-and-continue = { limit = 3 } }
///
///     [[steps]]
///     name = "load"
///     sinks = ["database", "xml"]
/// "#).unwrap();
///
/// assert_eq!(config.chunk.size, 50);
/// assert_eq!(config.steps[0].sinks, vec![Sink::Database, Sink::Xml]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchConfig {
    pub job_name: String,
    /// JSON file keeping executions across launches, in memory when absent
    pub repository: Option<PathBuf>,
    pub input: InputConfig,
    pub chunk: ChunkConfig,
    pub database: DatabaseConfig,
    pub flat_file: FlatFileConfig,
    pub xml: XmlConfig,
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub path: PathBuf,
    pub delimiter: char,
    /// When false, columns are mapped as `lastName,firstName`
    pub has_headers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChunkConfig {
    pub size: usize,
    /// Worker threads per step, 1 for a sequential step
    pub concurrency: usize,
    pub skip_policy: SkipPolicy,
    pub retry_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub url: String,
    pub table: String,
    pub max_connections: u32,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlatFileConfig {
    pub path: PathBuf,
    pub append: bool,
    pub delimiter: char,
    pub has_headers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct XmlConfig {
    pub path: PathBuf,
    pub root_tag: String,
    pub item_tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub name: String,
    pub sinks: Vec<Sink>,
}

/// Destinations a step can write its chunks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sink {
    Database,
    FlatFile,
    Xml,
    Logger,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            job_name: "importUserJob".to_string(),
            repository: None,
            input: InputConfig::default(),
            chunk: ChunkConfig::default(),
            database: DatabaseConfig::default(),
            flat_file: FlatFileConfig::default(),
            xml: XmlConfig::default(),
            steps: vec![
                StepConfig::new("step1", &[Sink::Database]),
                StepConfig::new("step2", &[Sink::FlatFile]),
                StepConfig::new("step3", &[Sink::Xml]),
            ],
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sample-data.csv"),
            delimiter: ',',
            has_headers: false,
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 5,
            concurrency: 1,
            skip_policy: SkipPolicy::FailFast,
            retry_limit: 0,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://people.db?mode=rwc".to_string(),
            table: "people".to_string(),
            max_connections: 10,
            timeout_ms: None,
        }
    }
}

impl Default for FlatFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("new file.csv"),
            append: true,
            delimiter: ',',
            has_headers: false,
        }
    }
}

impl Default for XmlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("students.xml"),
            root_tag: "students".to_string(),
            item_tag: "person".to_string(),
        }
    }
}

impl StepConfig {
    pub fn new(name: &str, sinks: &[Sink]) -> Self {
        Self {
            name: name.to_string(),
            sinks: sinks.to_vec(),
        }
    }
}

impl DatabaseConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Converts a configured delimiter to the single byte the CSV adapters use.
pub fn delimiter_byte(delimiter: char) -> Result<u8, BatchError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| {
            BatchError::Configuration(format!("delimiter {:?} is not an ASCII character", delimiter))
        })
}

pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl BatchConfig {
    /// Parses and validates a TOML document.
    pub fn parse(document: &str) -> Result<Self, BatchError> {
        let config: BatchConfig = toml::from_str(document)
            .map_err(|error| BatchError::Configuration(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates the TOML file at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let document = fs::read_to_string(path).map_err(|error| {
            BatchError::Configuration(format!("unable to read {}: {}", path.display(), error))
        })?;
        Self::parse(&document)
    }

    /// Sinks used by at least one step.
    pub fn sinks(&self) -> HashSet<Sink> {
        self.steps
            .iter()
            .flat_map(|step| step.sinks.iter().copied())
            .collect()
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        let invalid = |message: String| Err(BatchError::Configuration(message));

        if self.job_name.trim().is_empty() {
            return invalid("job_name must not be empty".to_string());
        }
        if self.chunk.size == 0 {
            return invalid("chunk.size must be at least 1".to_string());
        }
        if self.chunk.concurrency == 0 {
            return invalid("chunk.concurrency must be at least 1".to_string());
        }
        delimiter_byte(self.input.delimiter)?;
        delimiter_byte(self.flat_file.delimiter)?;
        if !is_sql_identifier(&self.database.table) {
            return invalid(format!(
                "database.table {:?} is not a plain SQL identifier",
                self.database.table
            ));
        }
        if self.database.max_connections == 0 {
            return invalid("database.max_connections must be at least 1".to_string());
        }
        if self.steps.is_empty() {
            return invalid("at least one step is required".to_string());
        }

        let mut names = HashSet::new();
        let mut used = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return invalid(format!("step {} is declared twice", step.name));
            }
            if step.sinks.is_empty() {
                return invalid(format!("step {} has no sink", step.name));
            }
            for sink in &step.sinks {
                // the logger keeps no state between steps
                if *sink != Sink::Logger && !used.insert(*sink) {
                    return invalid(format!("sink {:?} is used by more than one step", sink));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn empty_document_should_yield_the_tutorial_job() {
        let config = BatchConfig::parse("").unwrap();

        assert_eq!(config, BatchConfig::default());
        assert_eq!(config.job_name, "importUserJob");
        assert_eq!(config.chunk.size, 5);
        assert_eq!(config.xml.root_tag, "students");
        assert_eq!(config.flat_file.path, PathBuf::from("new file.csv"));
        assert!(config.flat_file.append);
        let names: Vec<&str> = config.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["step1", "step2", "step3"]);
    }

    #[test]
    fn file_should_override_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            repository = "executions.json"

            [input]
            path = "people.csv"
            delimiter = ";"
            has_headers = true

            [chunk]
            size = 100
            concurrency = 4
            retry_limit = 2
            skip_policy = "fail-fast"

            [database]
            url = "sqlite::memory:"
            timeout_ms = 1500

            [[steps]]
            name = "all"
            sinks = ["database", "flat-file", "xml", "logger"]
            "#
        )
        .unwrap();

        let config = BatchConfig::from_path(file.path()).unwrap();

        assert_eq!(config.repository, Some(PathBuf::from("executions.json")));
        assert_eq!(config.input.delimiter, ';');
        assert!(config.input.has_headers);
        assert_eq!(config.chunk.concurrency, 4);
        assert_eq!(config.chunk.retry_limit, 2);
        assert_eq!(config.database.table, "people");
        assert_eq!(config.database.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.steps.len(), 1);
        assert_eq!(config.sinks().len(), 4);
    }

    #[test]
    fn invalid_values_should_be_configuration_errors() {
        let documents = [
            "[chunk]\nsize = 0",
            "[chunk]\nconcurrency = 0",
            "[input]\ndelimiter = \"é\"",
            "[database]\ntable = \"people; DROP TABLE people\"",
            "steps = []",
            "[[steps]]\nname = \"a\"\nsinks = []",
            "[[steps]]\nname = \"a\"\nsinks = [\"xml\"]\n[[steps]]\nname = \"a\"\nsinks = [\"logger\"]",
            "[[steps]]\nname = \"a\"\nsinks = [\"xml\"]\n[[steps]]\nname = \"b\"\nsinks = [\"xml\"]",
            "unknown_key = 1",
        ];

        for document in documents {
            let result = BatchConfig::parse(document);
            assert!(
                matches!(result, Err(BatchError::Configuration(_))),
                "{:?} should be rejected",
                document
            );
        }
    }

    #[test]
    fn logger_sink_may_be_shared_by_steps() {
        let config = BatchConfig::parse(
            "[[steps]]\nname = \"a\"\nsinks = [\"logger\"]\n[[steps]]\nname = \"b\"\nsinks = [\"logger\"]",
        );
        assert!(config.is_ok());
    }

    #[test]
    fn skip_and_continue_should_parse_as_inline_table() {
        let config =
            BatchConfig::parse("[chunk]\nskip_policy = { skip-and-continue = { limit = 7 } }")
                .unwrap();
        assert_eq!(config.chunk.skip_policy, SkipPolicy::SkipAndContinue { limit: 7 });
    }
}
