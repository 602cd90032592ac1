#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful for debugging.
pub mod logger;

#[cfg(any(feature = "csv", feature = "xml"))]
mod destination;

#[cfg(feature = "csv")]
/// This module provides a CSV item reader and writer implementation.
pub mod csv;

#[cfg(feature = "xml")]
/// This module provides an XML item writer implementation.
pub mod xml;

#[cfg(feature = "rdbc")]
/// This module provides an RDBC (SQLite) item writer implementation.
pub mod rdbc;
