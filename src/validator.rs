//! Validate input data against schemas.
//!
//! This module contains logic related to *validation*, the process of
//! taking a piece of input data (called an "instance") and checking if
//! it's valid according to a schema.
//!
//! See the docs for [`Validator`](struct.Validator.html) for more.

use failure::Error;
use serde_json::Value;
use url::Url;

use crate::options::ValidationOptions;
use crate::results::ValidationResults;
use crate::schema::Schema;
use crate::vm;

/// Compiles schemas and validates instances against them.
#[derive(Debug, Default)]
pub struct Validator {
    options: ValidationOptions,
}

impl Validator {
    /// Constructs a new validator using the default options.
    pub fn new() -> Self {
        Self::new_with_options(ValidationOptions::default())
    }

    /// Constructs a new validator using the given options.
    pub fn new_with_options(options: ValidationOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Compile a schema document into this validator's registry.
    ///
    /// See [`compile`](fn.compile.html).
    pub fn compile(&self, document: &Value) -> Result<Schema, Error> {
        compile(document, &self.options)
    }

    /// Validate an instance against a compiled schema.
    ///
    /// See [`validate`](fn.validate.html).
    pub fn validate(&self, schema: &Schema, instance: &Value) -> ValidationResults {
        validate(schema, instance, &self.options)
    }
}

/// Compile a schema document and register it in the options' registry.
///
/// The document is registered under its root `$id`, resolved against the
/// options' default base URI; documents without an `$id` occupy the
/// default base URI itself, so give distinct anonymous documents
/// distinct registries (or `$id`s) to keep them apart. The draft is the
/// one forced by the options, or else detected from `$schema`, falling
/// back to 2020-12.
pub fn compile(document: &Value, options: &ValidationOptions) -> Result<Schema, Error> {
    let uri: Url = match document.get("$id").and_then(Value::as_str) {
        Some(id) => options.get_default_base_uri().join(id).map_err(|_| {
            crate::errors::SchemaError::InvalidSchema {
                location: "/$id".to_owned(),
                reason: format!("\"{}\" is not a valid URI", id),
            }
        })?,
        None => options.get_default_base_uri().clone(),
    };
    options
        .registry()
        .register(&uri, document, options.get_evaluate_as())
}

/// Validate `instance` against `schema` and return the result tree.
///
/// Validation never fails as a Rust error: instances that violate the
/// schema produce a tree whose root is invalid, and cancellation
/// produces a partial tree whose root is invalid. The shape of the tree
/// follows the options' output format.
pub fn validate(
    schema: &Schema,
    instance: &Value,
    options: &ValidationOptions,
) -> ValidationResults {
    vm::validate(schema, instance, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OutputFormat;
    use serde_json::json;

    #[test]
    fn compile_then_validate() {
        let validator = Validator::new();
        let schema = validator
            .compile(&json!({"type": "string", "minLength": 2}))
            .unwrap();
        assert!(validator.validate(&schema, &json!("ab")).is_valid());
        assert!(!validator.validate(&schema, &json!("a")).is_valid());
        assert!(!validator.validate(&schema, &json!(5)).is_valid());
    }

    #[test]
    fn flag_output_short_circuits_to_a_bare_verdict() {
        let mut options = ValidationOptions::new();
        options.output_format(OutputFormat::Flag);
        let validator = Validator::new_with_options(options);
        let schema = validator
            .compile(&json!({"type": "object", "required": ["a", "b"]}))
            .unwrap();
        let results = validator.validate(&schema, &json!({"c": 1}));
        assert!(!results.is_valid());
        assert_eq!(
            results.serialize(crate::options::OutputStyle::Post2020),
            json!({"valid": false})
        );
    }

    #[test]
    fn cancellation_returns_a_partial_invalid_tree() {
        let token = crate::options::CancellationToken::new();
        token.cancel();
        let mut options = ValidationOptions::new();
        options.cancellation(token);
        let validator = Validator::new_with_options(options);
        let schema = validator.compile(&json!({"type": "integer"})).unwrap();
        let results = validator.validate(&schema, &json!(3));
        assert!(!results.is_valid());
        assert_eq!(
            results.errors().get(""),
            Some(&json!("validation was cancelled"))
        );
    }

    #[test]
    fn boolean_schemas_accept_and_reject_everything() {
        let validator = Validator::new();
        let accept = validator.compile(&json!(true)).unwrap();
        assert!(validator.validate(&accept, &json!({"anything": [1, 2]})).is_valid());

        let registry = std::sync::Arc::new(crate::registry::SchemaRegistry::new());
        let mut options = ValidationOptions::new();
        options.schema_registry(registry);
        let validator = Validator::new_with_options(options);
        let reject = validator.compile(&json!(false)).unwrap();
        let results = validator.validate(&reject, &json!(null));
        assert!(!results.is_valid());
        assert_eq!(
            results.errors().get(""),
            Some(&json!("All values fail against the false schema"))
        );
    }
}
