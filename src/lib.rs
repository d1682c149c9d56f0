//! `jsv` is a Rust implementation of JSON Schema validation for drafts
//! 2019-09 and 2020-12: the engine that, given a schema document and an
//! instance document, decides conformance and produces a structured
//! result tree carrying annotations and errors.
//!
//! # Validating data
//!
//! The most common use-case for this crate is checking that some JSON
//! input is really valid against a schema. Here's how you'd achieve that
//! use-case:
//!
//! ```
//! use serde_json::json;
//! use jsv::{OutputStyle, Validator};
//! use failure::Error;
//!
//! fn main() -> Result<(), Error> {
//!     let validator = Validator::new();
//!
//!     // Compiling resolves `$id`s and anchors, binds every keyword to
//!     // its handler, and registers the document in the validator's
//!     // schema registry.
//!     let schema = validator.compile(&json!({
//!         "type": "object",
//!         "properties": {
//!             "name": { "type": "string" },
//!             "age": { "type": "integer", "minimum": 0 }
//!         },
//!         "required": ["name"]
//!     }))?;
//!
//!     let good = validator.validate(&schema, &json!({
//!         "name": "John Doe",
//!         "age": 43
//!     }));
//!     assert!(good.is_valid());
//!
//!     // Validation failures are ordinary results, not Rust errors. The
//!     // result tree records which keyword rejected which part of the
//!     // instance, and can be reduced and serialized in the standard
//!     // output shapes.
//!     let mut bad = validator.validate(&schema, &json!({ "age": -1 }));
//!     assert!(!bad.is_valid());
//!
//!     bad.to_basic();
//!     let rendered = bad.serialize(OutputStyle::Post2020);
//!     assert_eq!(rendered["valid"], json!(false));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Schemas that reference each other
//!
//! Schemas may refer to one another by URI through `$ref`,
//! `$recursiveRef` (2019-09), and `$dynamicRef` (2020-12). Register each
//! document in a shared [`SchemaRegistry`](registry/struct.SchemaRegistry.html),
//! or give the registry a [`Fetch`](registry/trait.Fetch.html)
//! implementation to pull unknown documents from wherever they live.
//! This crate does not presume how or whether you want to fetch schemas
//! over the network.
//!
//! # Output formats
//!
//! Evaluation produces a hierarchical
//! [`ValidationResults`](results/struct.ValidationResults.html) tree.
//! `to_basic` flattens it to a single-level list, `to_flag` reduces it
//! to a bare verdict, and `serialize` renders the post-2020-12 shape or
//! the earlier `keywordLocation`-based shape.

mod vm;

pub mod errors;
pub mod json;
pub mod keywords;
pub mod options;
pub mod pointer;
pub mod registry;
pub mod results;
pub mod schema;
pub mod validator;
pub mod vocabulary;

pub use crate::errors::SchemaError;
pub use crate::options::{
    CancellationToken, OutputFormat, OutputStyle, ValidationOptions,
};
pub use crate::pointer::{JsonPointer, Segment};
pub use crate::registry::{Fetch, SchemaRegistry};
pub use crate::results::ValidationResults;
pub use crate::schema::{Draft, ObjectSchema, Schema};
pub use crate::validator::{compile, validate, Validator};
pub use crate::vocabulary::{meta_validate, Vocabulary};
