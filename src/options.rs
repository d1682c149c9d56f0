//! Configuration for how validation should proceed.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

use crate::registry::SchemaRegistry;
use crate::schema::Draft;

/// How much structure the result tree keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Only the boolean verdict.
    Flag,
    /// A flat list of results under the root.
    Basic,
    /// The full tree, as evaluated.
    Hierarchical,
}

/// Which serialized shape [`ValidationResults::serialize`](../results/struct.ValidationResults.html#method.serialize)
/// renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    /// The post-2020-12 shape: `evaluationPath`, `schemaLocation`,
    /// keyword-keyed `errors` / `annotations` objects, `nested` children.
    Post2020,
    /// The earlier shape: `keywordLocation`, `absoluteKeywordLocation`,
    /// per-keyword entries in `errors` / `annotations` arrays.
    Pre2020,
}

/// A cooperative cancellation token.
///
/// The evaluator checks the token at each keyword boundary; once
/// cancelled, it fails the current node and unwinds, returning a partial
/// result tree whose root is invalid. Timeouts are realized by
/// cancelling from another thread; the evaluator owns no timers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Options carried through compilation and evaluation.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    default_base_uri: Url,
    output_format: OutputFormat,
    evaluate_as: Option<Draft>,
    validate_format: bool,
    require_format_validation: bool,
    schema_registry: Arc<SchemaRegistry>,
    log: bool,
    max_depth: usize,
    cancellation: Option<CancellationToken>,
}

impl ValidationOptions {
    /// Create a new, default set of options.
    pub fn new() -> ValidationOptions {
        ValidationOptions::default()
    }

    /// Sets the base URI given to schemas that declare no `$id`. The
    /// default is `https://json-everything.net/base`.
    pub fn default_base_uri(&mut self, uri: Url) -> &mut Self {
        self.default_base_uri = uri;
        self
    }

    /// Sets the output format. The default is
    /// [`OutputFormat::Hierarchical`](enum.OutputFormat.html); under
    /// [`OutputFormat::Flag`](enum.OutputFormat.html) assertions
    /// short-circuit, so invalid instances are detected faster but the
    /// tree carries no detail.
    pub fn output_format(&mut self, format: OutputFormat) -> &mut Self {
        self.output_format = format;
        self
    }

    /// Forces a draft regardless of what `$schema` declares. By default
    /// the draft is detected from `$schema`, falling back to 2020-12.
    pub fn evaluate_as(&mut self, draft: Draft) -> &mut Self {
        self.evaluate_as = Some(draft);
        self
    }

    /// Treats `format` as an assertion rather than an annotation. Off by
    /// default.
    pub fn validate_format(&mut self, validate: bool) -> &mut Self {
        self.validate_format = validate;
        self
    }

    /// When `format` is validated, fail on formats that have no
    /// registered validator instead of ignoring them. Off by default.
    pub fn require_format_validation(&mut self, require: bool) -> &mut Self {
        self.require_format_validation = require;
        self
    }

    /// Sets the registry schemas are compiled into and resolved from.
    pub fn schema_registry(&mut self, registry: Arc<SchemaRegistry>) -> &mut Self {
        self.schema_registry = registry;
        self
    }

    /// Emits a `tracing` event for every keyword evaluated. Off by
    /// default.
    pub fn log(&mut self, log: bool) -> &mut Self {
        self.log = log;
        self
    }

    /// Sets the maximum number of reference delegations to follow before
    /// aborting evaluation. The default is 64.
    ///
    /// When evaluation is aborted because of this limit, validation
    /// *fails*: the node that followed the last reference carries the
    /// error and the returned tree is partial.
    pub fn max_depth(&mut self, max_depth: usize) -> &mut Self {
        self.max_depth = max_depth;
        self
    }

    /// Supplies a cancellation token for this validation.
    pub fn cancellation(&mut self, token: CancellationToken) -> &mut Self {
        self.cancellation = Some(token);
        self
    }

    pub fn get_default_base_uri(&self) -> &Url {
        &self.default_base_uri
    }

    pub fn get_output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn get_evaluate_as(&self) -> Option<Draft> {
        self.evaluate_as
    }

    pub fn get_validate_format(&self) -> bool {
        self.validate_format
    }

    pub fn get_require_format_validation(&self) -> bool {
        self.require_format_validation
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.schema_registry
    }

    pub fn get_log(&self) -> bool {
        self.log
    }

    pub fn get_max_depth(&self) -> usize {
        self.max_depth
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            default_base_uri: "https://json-everything.net/base"
                .parse()
                .expect("default base URI parses"),
            output_format: OutputFormat::Hierarchical,
            evaluate_as: None,
            validate_format: false,
            require_format_validation: false,
            schema_registry: Arc::new(SchemaRegistry::new()),
            log: false,
            max_depth: 64,
            cancellation: None,
        }
    }
}
