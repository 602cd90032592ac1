use crate::core::item::{ItemWriter, ItemWriterResult};
use crate::error::BatchError;
use crate::item::destination::Destination;
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Writer,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

struct XmlState<W: Write> {
    pending: Option<Destination<W>>,
    /// Set once the declaration and the root start tag are written
    writer: Option<Writer<BufWriter<W>>>,
    closed: bool,
}

/// A writer that marshals items into a single XML document.
///
/// `open` creates the destination and emits the XML declaration and the
/// root start tag, each `write` appends one element per item and `close`
/// emits the root end tag. A step always closes its writers, so the
/// document is well formed even when the step fails. A writer that was
/// never opened writes nothing, not even on `close`.
///
/// # Examples
///
/// ```
/// use batch_pipeline::item::xml::xml_writer::XmlItemWriterBuilder;
/// use batch_pipeline::core::item::ItemWriter;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Student {
///     #[serde(rename = "@id")]
///     id: i32,
///     name: String,
/// }
///
/// let writer = XmlItemWriterBuilder::new()
///     .root_tag("students")
///     .item_tag("student")
///     .from_writer::<Student, _>(Vec::new());
///
/// writer.open().unwrap();
/// writer.write(&[Student { id: 1, name: "Alice".to_string() }]).unwrap();
/// writer.close().unwrap();
///
/// let xml = String::from_utf8(writer.into_inner().unwrap()).unwrap();
/// assert_eq!(
///     xml,
///     r#"<?xml version="1.0" encoding="UTF-8"?><students><student id="1"><name>Alice</name></student></students>"#
/// );
/// ```
pub struct XmlItemWriter<T, W: Write = File> {
    state: Mutex<XmlState<W>>,
    item_tag: String,
    root_tag: String,
    _phantom: PhantomData<fn(T)>,
}

impl<T, W: Write> XmlItemWriter<T, W> {
    fn state(&self) -> Result<MutexGuard<'_, XmlState<W>>, BatchError> {
        self.state
            .lock()
            .map_err(|_| BatchError::ItemWriter("XML writer poisoned".to_string()))
    }

    /// Returns the underlying destination, flushing buffered output first.
    pub fn into_inner(self) -> Result<W, BatchError> {
        let state = self
            .state
            .into_inner()
            .map_err(|_| BatchError::ItemWriter("XML writer poisoned".to_string()))?;
        match state.writer {
            Some(writer) => writer
                .into_inner()
                .into_inner()
                .map_err(|e| BatchError::ItemWriter(format!("Failed to flush XML file: {}", e))),
            None => state
                .pending
                .and_then(Destination::into_writer)
                .ok_or_else(|| BatchError::ItemWriter("XML writer has no output".to_string())),
        }
    }
}

impl<T, W: Write + Send> ItemWriter<T> for XmlItemWriter<T, W>
where
    T: Serialize,
{
    fn write(&self, items: &[T]) -> ItemWriterResult {
        let mut state = self.state()?;
        let closed = state.closed;
        let writer = match state.writer.as_mut() {
            Some(writer) if !closed => writer,
            _ => return Err(BatchError::ItemWriter("XML writer is not open".to_string())),
        };
        for item in items {
            writer
                .write_serializable(&self.item_tag, item)
                .map_err(|e| BatchError::ItemWriter(format!("Failed to write XML item: {}", e)))?;
        }
        Ok(())
    }

    fn flush(&self) -> ItemWriterResult {
        match self.state()?.writer.as_mut() {
            Some(writer) => writer
                .get_mut()
                .flush()
                .map_err(|e| BatchError::ItemWriter(format!("Failed to flush XML file: {}", e))),
            None => Ok(()),
        }
    }

    fn open(&self) -> ItemWriterResult {
        let mut state = self.state()?;
        let destination = state
            .pending
            .take()
            .ok_or_else(|| BatchError::ItemWriter("XML writer already opened".to_string()))?;
        let target = destination.describe();
        let (output, _) = destination.open().map_err(|e| {
            BatchError::ItemWriter(format!("Failed to create XML file {}: {}", target, e))
        })?;

        let mut writer = Writer::new(BufWriter::new(output));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| BatchError::ItemWriter(format!("Failed to write XML declaration: {}", e)))?;
        writer
            .write_event(Event::Start(BytesStart::new(&self.root_tag)))
            .map_err(|e| BatchError::ItemWriter(format!("Failed to write XML root: {}", e)))?;
        state.writer = Some(writer);
        Ok(())
    }

    fn close(&self) -> ItemWriterResult {
        {
            let mut state = self.state()?;
            if state.closed {
                return Ok(());
            }
            let Some(writer) = state.writer.as_mut() else {
                return Ok(());
            };
            writer
                .write_event(Event::End(BytesEnd::new(&self.root_tag)))
                .map_err(|e| BatchError::ItemWriter(format!("Failed to write XML end: {}", e)))?;
            state.closed = true;
        }
        ItemWriter::<T>::flush(self)
    }
}

/// Builder for creating XML item writers.
///
/// The default root tag is "root" and the default item tag is the
/// lowercase name of the serialized type.
pub struct XmlItemWriterBuilder {
    root_tag: String,
    item_tag: Option<String>,
}

impl Default for XmlItemWriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlItemWriterBuilder {
    pub fn new() -> Self {
        Self {
            root_tag: "root".to_string(),
            item_tag: None,
        }
    }

    /// Sets the tag wrapping all items of the document.
    pub fn root_tag(mut self, root_tag: &str) -> Self {
        self.root_tag = root_tag.to_string();
        self
    }

    /// Sets the tag wrapping each item.
    pub fn item_tag(mut self, item_tag: &str) -> Self {
        self.item_tag = Some(item_tag.to_string());
        self
    }

    fn item_tag_for<T>(&self) -> String {
        self.item_tag.clone().unwrap_or_else(|| {
            std::any::type_name::<T>()
                .split("::")
                .last()
                .unwrap_or("item")
                .to_lowercase()
        })
    }

    fn build<T, W: Write>(self, destination: Destination<W>) -> XmlItemWriter<T, W> {
        let item_tag = self.item_tag_for::<T>();
        XmlItemWriter {
            state: Mutex::new(XmlState {
                pending: Some(destination),
                writer: None,
                closed: false,
            }),
            item_tag,
            root_tag: self.root_tag,
            _phantom: PhantomData,
        }
    }

    /// Creates an `XmlItemWriter` for the file at `path`.
    ///
    /// The file is created, or truncated, when the writer is opened.
    pub fn from_path<T: Serialize, P: AsRef<Path>>(self, path: P) -> XmlItemWriter<T> {
        self.build(Destination::file(path.as_ref(), false))
    }

    /// Creates an `XmlItemWriter` from any destination.
    pub fn from_writer<T: Serialize, W: Write>(self, wtr: W) -> XmlItemWriter<T, W> {
        self.build(Destination::Writer(wtr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use tempfile::NamedTempFile;

    const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

    #[derive(Debug, Serialize)]
    struct Course {
        #[serde(rename = "@code")]
        code: String,
        title: String,
    }

    #[derive(Debug, Serialize)]
    struct Student {
        #[serde(rename = "@id")]
        id: i32,
        #[serde(rename = "@active")]
        active: bool,
        name: String,
        course: Vec<Course>,
    }

    #[derive(Debug, Serialize)]
    struct SimpleItem {
        id: i32,
        name: String,
        value: f64,
    }

    fn render<T: Serialize>(writer: XmlItemWriter<T, Vec<u8>>, items: &[T]) -> String {
        writer.open().unwrap();
        writer.write(items).unwrap();
        writer.close().unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn nested_items_should_be_written_with_attributes() {
        let temp_file = NamedTempFile::new().unwrap();
        let writer = XmlItemWriterBuilder::new()
            .root_tag("students")
            .item_tag("student")
            .from_path::<Student, _>(temp_file.path());

        let items = vec![
            Student {
                id: 1,
                active: true,
                name: "Jon Doe".to_string(),
                course: vec![
                    Course {
                        code: "CS101".to_string(),
                        title: "Algorithms".to_string(),
                    },
                    Course {
                        code: "MA201".to_string(),
                        title: "Linear Algebra".to_string(),
                    },
                ],
            },
            Student {
                id: 2,
                active: false,
                name: "Anna Smith".to_string(),
                course: vec![],
            },
        ];

        writer.open().unwrap();
        writer.write(&items).unwrap();
        writer.close().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();

        assert!(content.starts_with(DECLARATION));
        assert!(content.contains("<students>"));
        assert!(content.ends_with("</students>"));
        assert!(content.contains("<student id=\"1\" active=\"true\">"));
        assert!(content.contains("<name>Jon Doe</name>"));
        assert!(content.contains("<course code=\"CS101\"><title>Algorithms</title></course>"));
        assert!(content.contains("<course code=\"MA201\">"));
        assert!(content.contains("<student id=\"2\" active=\"false\">"));
        assert!(content.contains("<name>Anna Smith</name>"));
    }

    #[test]
    fn items_should_be_written_in_order() {
        let writer = XmlItemWriterBuilder::new()
            .root_tag("items")
            .item_tag("item")
            .from_writer::<SimpleItem, _>(Vec::new());

        let content = render(
            writer,
            &[
                SimpleItem {
                    id: 1,
                    name: "Item 1".to_string(),
                    value: 10.5,
                },
                SimpleItem {
                    id: 2,
                    name: "Item 2".to_string(),
                    value: 20.75,
                },
            ],
        );

        let first = content.find("<id>1</id>").unwrap();
        let second = content.find("<id>2</id>").unwrap();
        assert!(first < second);
        assert!(content.contains("<value>20.75</value>"));
    }

    #[test]
    fn empty_document_should_still_be_well_formed() {
        let writer = XmlItemWriterBuilder::new()
            .root_tag("items")
            .item_tag("item")
            .from_writer::<SimpleItem, _>(Vec::new());

        let content = render(writer, &[]);

        assert_eq!(content, format!("{}<items></items>", DECLARATION));
    }

    #[test]
    fn default_item_tag_should_be_the_type_name() {
        let writer = XmlItemWriterBuilder::new()
            .root_tag("items")
            .from_writer::<SimpleItem, _>(Vec::new());

        let content = render(
            writer,
            &[SimpleItem {
                id: 1,
                name: "Test".to_string(),
                value: 1.0,
            }],
        );

        assert!(content.contains("<simpleitem>"));
        assert!(content.contains("</simpleitem>"));
    }

    #[test]
    fn special_characters_should_be_escaped() {
        let writer = XmlItemWriterBuilder::new()
            .root_tag("items")
            .item_tag("item")
            .from_writer::<SimpleItem, _>(Vec::new());

        let content = render(
            writer,
            &[SimpleItem {
                id: 1,
                name: "Item with < and > & symbols".to_string(),
                value: 10.5,
            }],
        );

        assert!(content.contains("Item with &lt; and &gt; &amp; symbols"));
    }

    #[test]
    fn invalid_path_should_fail_on_open() {
        let writer = XmlItemWriterBuilder::new()
            .root_tag("items")
            .item_tag("item")
            .from_path::<SimpleItem, _>("/nonexistent/directory/file.xml");

        match ItemWriter::<SimpleItem>::open(&writer) {
            Err(BatchError::ItemWriter(message)) => {
                assert!(message.contains("Failed to create XML file"))
            }
            Err(other) => panic!("Expected ItemWriter error, got {:?}", other),
            Ok(_) => panic!("Expected an error"),
        }
    }

    #[test]
    fn default_builder_should_use_the_root_tag() {
        let writer = XmlItemWriterBuilder::default()
            .item_tag("p")
            .from_writer::<SimpleItem, _>(Vec::new());

        let content = render(
            writer,
            &[SimpleItem {
                id: 1,
                name: "a".to_string(),
                value: 1.0,
            }],
        );

        assert!(content.starts_with(&format!("{}<root><p>", DECLARATION)));
        assert!(content.ends_with("</p></root>"));
    }

    #[test]
    fn unopened_writer_should_leave_its_file_alone() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "<students></students>").unwrap();

        let writer = XmlItemWriterBuilder::new()
            .root_tag("students")
            .from_path::<SimpleItem, _>(temp_file.path());
        ItemWriter::<SimpleItem>::close(&writer).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "<students></students>");
    }

    #[test]
    fn writing_before_open_should_fail() {
        let writer = XmlItemWriterBuilder::new().from_writer::<SimpleItem, _>(Vec::new());
        let items = [SimpleItem {
            id: 1,
            name: "a".to_string(),
            value: 1.0,
        }];

        assert!(writer.write(&items).is_err());
        assert!(writer.into_inner().unwrap().is_empty());
    }

    #[test]
    fn second_close_should_not_repeat_the_end_tag() {
        let writer = XmlItemWriterBuilder::new()
            .root_tag("items")
            .from_writer::<SimpleItem, _>(Vec::new());
        writer.open().unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        let content = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(content, format!("{}<items></items>", DECLARATION));
    }
}
