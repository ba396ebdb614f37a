//! Variable catalog: canonical names, descriptions and search over the
//! controller's data structures (`Motor[].Servo.Kp`, `Sys.ServoPeriod`, ...).
//!
//! The catalog is a JSON array of objects, each with a `path` and any number
//! of metadata fields:
//!
//! ```json
//! [{ "path": "Motor[].Servo.Kp", "Comments": "Proportional gain", "Type": "float" }]
//! ```
//!
//! A trailing `[]` marks a segment that takes an index.

mod catalog;
mod error;
mod path;

pub use catalog::{Catalog, CatalogEntry, CatalogNode, Metadata};
pub use error::CompleterError;
pub use path::{PathSegment, parse_path};
