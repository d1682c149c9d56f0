//! An error type for schema compilation and registry operations.

use failure::Fail;
use url::Url;

/// An enum of possible errors that can emerge from this crate.
///
/// Note that an instance failing validation is *not* an error in this
/// sense. Validation failures are the ordinary outcome of
/// [`validate`](../validator/fn.validate.html) and are carried by the
/// returned result tree; `SchemaError` covers problems with schemas
/// themselves and with the machinery around them.
#[derive(Debug, Fail, PartialEq)]
pub enum SchemaError {
  /// A schema document is malformed.
  ///
  /// Schemas must be booleans or objects, and each keyword constrains the
  /// shape of its value (`minLength` takes a non-negative number,
  /// `required` takes an array of strings, and so on). Compiling a
  /// document that breaks one of these rules produces this error.
  #[fail(display = "invalid schema at {}: {}", location, reason)]
  InvalidSchema { location: String, reason: String },

  /// A reference target could not be found.
  ///
  /// `$ref`, `$recursiveRef`, and `$dynamicRef` name other schemas by
  /// URI. When the target is not in the registry and the configured
  /// resolver (if any) cannot produce it, the reference is unresolvable.
  #[fail(display = "cannot resolve reference: {}", uri)]
  UnresolvedReference { uri: String },

  /// Two different documents were registered under the same URI.
  ///
  /// Registering the same document twice under one URI is accepted and
  /// idempotent. Registering a *different* document under an already
  /// occupied URI is a conflict.
  #[fail(display = "conflicting registration for {}", uri)]
  RegistryConflict { uri: Url },

  /// A chain of references loops back on itself.
  ///
  /// A schema whose reference points, possibly through other references,
  /// back to itself can never terminate. Such chains are detected when
  /// the document is registered.
  #[fail(display = "reference cycle detected through {}", uri)]
  ReferenceCycle { uri: String },

  /// Evaluation was cancelled through the cooperative token.
  #[fail(display = "validation was cancelled")]
  Cancelled,

  /// The maximum reference-delegation depth was exceeded during
  /// evaluation.
  ///
  /// This likely means that your configured `max_depth` is too small for
  /// the instance being validated, or that the schema recurses without
  /// consuming the instance.
  #[fail(display = "maximum reference depth of {} exceeded", limit)]
  MaxDepthExceeded { limit: usize },
}
