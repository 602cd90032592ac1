/// XML support for writing structured data.
///
/// Items are marshalled with `quick-xml`'s serde support inside a single
/// root element. Attributes are declared with
/// `#[serde(rename = "@attribute_name")]`.
pub mod xml_writer;

pub use xml_writer::XmlItemWriter;
pub use xml_writer::XmlItemWriterBuilder;
