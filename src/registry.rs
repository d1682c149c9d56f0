//! Logic related to holding a collection of schemas together.
//!
//! A [`SchemaRegistry`](struct.SchemaRegistry.html) owns compiled
//! schemas for its lifetime and resolves URIs, anchors, and dynamic
//! anchors to them. Registration is append-only: after a document
//! compiles, its schemas never change, so a registry shared between
//! threads can serve concurrent validations.

use crate::errors::SchemaError;
use crate::json;
use crate::schema::{self, Draft, Schema};
use crate::vm::DynamicScope;
use failure::{bail, Error};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

/// Fetches raw schema documents for URIs the registry has not seen.
///
/// Implementations may front a network client, a file system, or a
/// bundle of embedded documents. Fetching happens while documents are
/// registered or prefetched, never in the middle of evaluating a
/// pre-compiled schema graph.
pub trait Fetch: Send + Sync {
    fn fetch(&self, uri: &Url) -> Result<Value, Error>;
}

/// Holds compiled schemas, keyed by the URIs and anchors that identify
/// them.
#[derive(Default)]
pub struct SchemaRegistry {
    /// Resource URI → compiled resource root.
    schemas: RwLock<HashMap<Url, Schema>>,
    /// Registration URI → raw document, for idempotence checks.
    documents: RwLock<HashMap<Url, Value>>,
    /// (resource URI, RFC 6901 pointer) → compiled subschema.
    locations: RwLock<HashMap<(Url, String), Schema>>,
    /// (resource URI, anchor name) → schema, from `$anchor`.
    anchors: RwLock<HashMap<(Url, String), Schema>>,
    /// (resource URI, anchor name) → schema, from `$dynamicAnchor`.
    dynamic_anchors: RwLock<HashMap<(Url, String), Schema>>,
    /// Anchor name → resources defining it dynamically.
    dynamic_anchor_names: RwLock<HashMap<String, Vec<Url>>>,
    resolver: Option<Box<dyn Fetch>>,
}

impl SchemaRegistry {
    /// Construct a new, empty registry with no resolver.
    pub fn new() -> SchemaRegistry {
        SchemaRegistry::default()
    }

    /// Construct a registry that consults `resolver` for unknown URIs.
    pub fn with_resolver(resolver: Box<dyn Fetch>) -> SchemaRegistry {
        SchemaRegistry {
            resolver: Some(resolver),
            ..SchemaRegistry::default()
        }
    }

    /// Compile `document` and register it under `uri`.
    ///
    /// Registration is idempotent: registering a deeply-equal document
    /// under the same URI again returns the previously compiled schema.
    /// Registering a *different* document under an occupied URI fails
    /// with [`SchemaError::RegistryConflict`](../errors/enum.SchemaError.html).
    ///
    /// `draft` forces a draft; `None` auto-detects from the document's
    /// `$schema`, defaulting to 2020-12.
    pub fn register(&self, uri: &Url, document: &Value, draft: Option<Draft>) -> Result<Schema, Error> {
        let uri = strip_fragment(uri);
        {
            let documents = self.documents.read().expect("registry lock poisoned");
            if let Some(existing) = documents.get(&uri) {
                if json::deep_eq(existing, document) {
                    trace!(%uri, "schema already registered");
                    return self.resolve(&uri);
                }
                bail!(SchemaError::RegistryConflict { uri });
            }
        }

        let draft = draft
            .or_else(|| crate::vocabulary::detect_draft(document))
            .unwrap_or_default();
        let compiled = schema::compile_document(document, &uri, draft)?;
        debug!(%uri, ?draft, resources = compiled.resources.len(), "registered schema document");

        let root_base = compiled
            .root
            .as_object()
            .map(|node| node.base_uri().clone());
        {
            let mut documents = self.documents.write().expect("registry lock poisoned");
            documents.insert(uri.clone(), document.clone());
            let mut schemas = self.schemas.write().expect("registry lock poisoned");
            schemas.insert(uri.clone(), compiled.root.clone());
            for (resource, schema) in &compiled.resources {
                schemas.insert(resource.clone(), schema.clone());
            }
            let mut locations = self.locations.write().expect("registry lock poisoned");
            for (resource, pointer, schema) in &compiled.locations {
                locations.insert((resource.clone(), pointer.clone()), schema.clone());
                if *resource != uri && Some(resource) == root_base.as_ref() {
                    // A root `$id` different from the registration URI:
                    // pointers resolve through either spelling.
                    locations.insert((uri.clone(), pointer.clone()), schema.clone());
                }
            }
            let mut anchors = self.anchors.write().expect("registry lock poisoned");
            for (resource, anchor, schema) in &compiled.anchors {
                anchors.insert((resource.clone(), anchor.clone()), schema.clone());
            }
            let mut dynamic_anchors = self.dynamic_anchors.write().expect("registry lock poisoned");
            let mut names = self
                .dynamic_anchor_names
                .write()
                .expect("registry lock poisoned");
            for (resource, anchor, schema) in &compiled.dynamic_anchors {
                dynamic_anchors.insert((resource.clone(), anchor.clone()), schema.clone());
                names.entry(anchor.clone()).or_default().push(resource.clone());
            }
        }

        self.prefetch(&compiled.references);
        self.check_reference_cycles(&compiled.root)?;
        Ok(compiled.root)
    }

    /// Resolve a URI, possibly carrying a pointer or anchor fragment, to
    /// a compiled schema.
    ///
    /// Unknown documents are fetched through the resolver when one is
    /// configured, then compiled and cached. Fails with
    /// [`SchemaError::UnresolvedReference`](../errors/enum.SchemaError.html)
    /// otherwise.
    pub fn resolve(&self, uri: &Url) -> Result<Schema, Error> {
        let fragment = uri.fragment().unwrap_or("").to_owned();
        let base = strip_fragment(uri);

        if !self.contains(&base) {
            let resolver = match &self.resolver {
                Some(resolver) => resolver,
                None => bail!(SchemaError::UnresolvedReference { uri: uri.to_string() }),
            };
            trace!(%base, "fetching schema through resolver");
            let document = resolver
                .fetch(&base)
                .map_err(|_| SchemaError::UnresolvedReference { uri: uri.to_string() })?;
            self.register(&base, &document, None)?;
        }

        let resolved = if fragment.is_empty() {
            self.schemas
                .read()
                .expect("registry lock poisoned")
                .get(&base)
                .cloned()
        } else if fragment.starts_with('/') || fragment.starts_with("%2F") {
            // Fragments come back percent-encoded; parsing the `#` form
            // decodes them.
            let pointer: crate::pointer::JsonPointer = format!("#{}", fragment).parse()?;
            self.locations
                .read()
                .expect("registry lock poisoned")
                .get(&(base, pointer.to_string()))
                .cloned()
        } else {
            self.anchor(&base, &fragment)
        };

        match resolved {
            Some(schema) => Ok(schema),
            None => bail!(SchemaError::UnresolvedReference { uri: uri.to_string() }),
        }
    }

    /// Resolve an anchor name at `base_uri`.
    ///
    /// A static lookup consults `$anchor` entries first, then
    /// `$dynamicAnchor` entries (a dynamic anchor is also a plain anchor
    /// for static references). A dynamic lookup first scans `scope` from
    /// the outermost frame inward and returns the schema of the first
    /// resource that defines a `$dynamicAnchor` with the same name,
    /// falling back to the static lookup.
    pub(crate) fn resolve_anchor(
        &self,
        base_uri: &Url,
        anchor: &str,
        dynamic: bool,
        scope: &DynamicScope,
    ) -> Option<Schema> {
        if dynamic && self.dynamic_anchor_defined(anchor) {
            let dynamic_anchors = self.dynamic_anchors.read().expect("registry lock poisoned");
            for frame_uri in scope.bases() {
                if let Some(schema) = dynamic_anchors.get(&(frame_uri.clone(), anchor.to_owned())) {
                    return Some(schema.clone());
                }
            }
        }
        self.anchor(base_uri, anchor)
    }

    /// The resource root registered for `base_uri`, if any.
    pub(crate) fn resource_root(&self, base_uri: &Url) -> Option<Schema> {
        self.schemas
            .read()
            .expect("registry lock poisoned")
            .get(base_uri)
            .cloned()
    }

    /// Whether `anchor` is declared dynamically by the resource at
    /// `base_uri`.
    pub(crate) fn has_dynamic_anchor(&self, base_uri: &Url, anchor: &str) -> bool {
        self.dynamic_anchors
            .read()
            .expect("registry lock poisoned")
            .contains_key(&(base_uri.clone(), anchor.to_owned()))
    }

    fn dynamic_anchor_defined(&self, anchor: &str) -> bool {
        self.dynamic_anchor_names
            .read()
            .expect("registry lock poisoned")
            .contains_key(anchor)
    }

    fn anchor(&self, base_uri: &Url, anchor: &str) -> Option<Schema> {
        let key = (base_uri.clone(), anchor.to_owned());
        if let Some(schema) = self.anchors.read().expect("registry lock poisoned").get(&key) {
            return Some(schema.clone());
        }
        self.dynamic_anchors
            .read()
            .expect("registry lock poisoned")
            .get(&key)
            .cloned()
    }

    fn contains(&self, base: &Url) -> bool {
        self.schemas
            .read()
            .expect("registry lock poisoned")
            .contains_key(base)
    }

    /// Fetch referenced documents up front so evaluation never blocks on
    /// I/O. Failures are left for evaluation to report against the node
    /// that uses the reference.
    fn prefetch(&self, references: &[Url]) {
        if self.resolver.is_none() {
            return;
        }
        for reference in references {
            let base = strip_fragment(reference);
            if !self.contains(&base) {
                if let Err(error) = self.resolve(&base) {
                    debug!(%base, %error, "prefetch failed; reference left for evaluation");
                }
            }
        }
    }

    /// Walk chains of schemas whose top level delegates through `$ref`;
    /// revisiting one means the chain can never terminate.
    fn check_reference_cycles(&self, root: &Schema) -> Result<(), Error> {
        // Checking from the freshly registered root is enough; older
        // documents were checked on their own registration.
        let mut pending = vec![root.clone()];
        while let Some(start) = pending.pop() {
            let node = match start.as_object() {
                Some(node) => node.clone(),
                None => continue,
            };
            for keyword in node.keywords() {
                if let crate::keywords::Keyword::Ref(target) = &keyword.handler {
                    let mut visited = vec![node.schema_uri()];
                    let mut current = target.clone();
                    loop {
                        let schema = match self.resolve(&current) {
                            Ok(schema) => schema,
                            Err(_) => break,
                        };
                        let object = match schema.as_object() {
                            Some(object) => object.clone(),
                            None => break,
                        };
                        if visited.contains(&object.schema_uri()) {
                            bail!(SchemaError::ReferenceCycle { uri: current.to_string() });
                        }
                        visited.push(object.schema_uri());
                        match object.keyword("$ref").map(|kw| &kw.handler) {
                            Some(crate::keywords::Keyword::Ref(next)) => current = next.clone(),
                            _ => break,
                        }
                    }
                }
                for sub in subschemas_of(&keyword.handler) {
                    pending.push(sub);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field(
                "documents",
                &self.documents.read().expect("registry lock poisoned").len(),
            )
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

fn strip_fragment(uri: &Url) -> Url {
    let mut uri = uri.clone();
    uri.set_fragment(None);
    uri
}

/// The immediate subschemas a keyword applies.
fn subschemas_of(handler: &crate::keywords::Keyword) -> Vec<Schema> {
    use crate::keywords::Keyword;
    match handler {
        Keyword::Defs(defs) => defs.iter().map(|(_, s)| s.clone()).collect(),
        Keyword::AllOf(subs) | Keyword::AnyOf(subs) | Keyword::OneOf(subs) => subs.clone(),
        Keyword::Not(sub)
        | Keyword::If(sub)
        | Keyword::Then(sub)
        | Keyword::Else(sub)
        | Keyword::AdditionalProperties(sub)
        | Keyword::PropertyNames(sub)
        | Keyword::Items(sub)
        | Keyword::AdditionalItems(sub)
        | Keyword::Contains(sub)
        | Keyword::UnevaluatedProperties(sub)
        | Keyword::UnevaluatedItems(sub)
        | Keyword::ContentSchema(sub) => vec![sub.clone()],
        Keyword::DependentSchemas(subs) | Keyword::Properties(subs) => {
            subs.iter().map(|(_, s)| s.clone()).collect()
        }
        Keyword::PatternProperties(subs) => subs.iter().map(|(_, _, s)| s.clone()).collect(),
        Keyword::PrefixItems(subs) | Keyword::TupleItems(subs) => subs.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uri(s: &str) -> Url {
        s.parse().unwrap()
    }

    #[test]
    fn register_is_idempotent_and_conflicts_on_change() {
        let registry = SchemaRegistry::new();
        let document = json!({"type": "object"});
        registry.register(&uri("https://example.com/a"), &document, None).unwrap();
        registry.register(&uri("https://example.com/a"), &document, None).unwrap();

        let different = json!({"type": "array"});
        let error = registry
            .register(&uri("https://example.com/a"), &different, None)
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "conflicting registration for https://example.com/a"
        );
    }

    #[test]
    fn resolve_follows_pointer_and_anchor_fragments() {
        let registry = SchemaRegistry::new();
        let document = json!({
            "$defs": {
                "named": {"$anchor": "mark", "type": "string"}
            }
        });
        registry.register(&uri("https://example.com/doc"), &document, None).unwrap();

        let by_pointer = registry
            .resolve(&uri("https://example.com/doc#/$defs/named"))
            .unwrap();
        let by_anchor = registry.resolve(&uri("https://example.com/doc#mark")).unwrap();
        assert_eq!(
            by_pointer.as_object().unwrap().location().to_string(),
            "/$defs/named"
        );
        assert_eq!(
            by_anchor.as_object().unwrap().location().to_string(),
            "/$defs/named"
        );
    }

    #[test]
    fn resolve_reports_unknown_uris() {
        let registry = SchemaRegistry::new();
        let error = registry.resolve(&uri("https://example.com/missing")).unwrap_err();
        assert!(error.to_string().contains("cannot resolve reference"));
    }

    #[test]
    fn resolver_is_consulted_for_unknown_documents() {
        struct Bundle;
        impl Fetch for Bundle {
            fn fetch(&self, uri: &Url) -> Result<Value, Error> {
                if uri.as_str() == "https://example.com/remote" {
                    Ok(json!({"type": "integer"}))
                } else {
                    bail!(SchemaError::UnresolvedReference { uri: uri.to_string() })
                }
            }
        }

        let registry = SchemaRegistry::with_resolver(Box::new(Bundle));
        let schema = registry.resolve(&uri("https://example.com/remote")).unwrap();
        assert!(schema.as_object().is_some());
        assert!(registry.resolve(&uri("https://example.com/absent")).is_err());
    }

    #[test]
    fn ref_only_cycles_are_rejected() {
        let registry = SchemaRegistry::new();
        let document = json!({
            "$defs": {
                "a": {"$ref": "#/$defs/b"},
                "b": {"$ref": "#/$defs/a"}
            },
            "$ref": "#/$defs/a"
        });
        let error = registry
            .register(&uri("https://example.com/loop"), &document, None)
            .unwrap_err();
        assert!(error.to_string().contains("reference cycle"));
    }

    #[test]
    fn recursive_schemas_with_structure_are_accepted() {
        let registry = SchemaRegistry::new();
        let document = json!({
            "$defs": {
                "node": {"properties": {"next": {"$ref": "#/$defs/node"}}}
            },
            "$ref": "#/$defs/node"
        });
        assert!(registry
            .register(&uri("https://example.com/tree"), &document, None)
            .is_ok());
    }
}
