//! Compiled schemas and the compilation pass.
//!
//! A schema document (a raw `serde_json::Value`) is compiled exactly
//! once: the walk assigns every subschema its absolute base URI and its
//! location pointer, indexes `$id` / `$anchor` / `$dynamicAnchor`, binds
//! each keyword to its handler (filtered by draft), and orders keywords
//! for execution. Compiled schemas are immutable and shared through
//! `Arc`, so one registry can serve concurrent validations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

use crate::errors::SchemaError;
use crate::keywords::{CompiledKeyword, Keyword, TypeSet};
use crate::pointer::JsonPointer;
use crate::vocabulary;
use failure::Error;
use regex::Regex;

/// The JSON Schema drafts this crate evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Draft {
    #[serde(rename = "2019-09")]
    Draft201909,
    #[serde(rename = "2020-12")]
    Draft202012,
}

impl Draft {
    /// The URI of this draft's meta-schema.
    pub fn meta_schema_uri(self) -> &'static str {
        match self {
            Draft::Draft201909 => "https://json-schema.org/draft/2019-09/schema",
            Draft::Draft202012 => "https://json-schema.org/draft/2020-12/schema",
        }
    }
}

impl Default for Draft {
    fn default() -> Draft {
        Draft::Draft202012
    }
}

/// A compiled schema: a boolean, or an object with bound keywords.
///
/// `true` accepts every instance and `false` rejects every instance.
/// Cloning is cheap; object schemas are shared behind `Arc`.
#[derive(Debug, Clone)]
pub enum Schema {
    Bool(bool),
    Object(Arc<ObjectSchema>),
}

impl Schema {
    /// The raw JSON this schema was compiled from.
    pub fn to_value(&self) -> Value {
        match self {
            Schema::Bool(b) => Value::Bool(*b),
            Schema::Object(node) => node.source.clone(),
        }
    }

    pub fn as_object(&self) -> Option<&Arc<ObjectSchema>> {
        match self {
            Schema::Object(node) => Some(node),
            Schema::Bool(_) => None,
        }
    }
}

/// An object schema with its identity and compiled keywords.
#[derive(Debug)]
pub struct ObjectSchema {
    base_uri: Url,
    location: JsonPointer,
    draft: Draft,
    keywords: Vec<CompiledKeyword>,
    dynamic_anchor: Option<String>,
    recursive_anchor: bool,
    source: Value,
}

impl ObjectSchema {
    /// The absolute URI of the schema resource this node belongs to (the
    /// innermost enclosing `$id`, or the registration URI).
    pub fn base_uri(&self) -> &Url {
        &self.base_uri
    }

    /// Pointer from the resource root to this node.
    pub fn location(&self) -> &JsonPointer {
        &self.location
    }

    pub fn draft(&self) -> Draft {
        self.draft
    }

    /// Keywords in execution order.
    pub fn keywords(&self) -> &[CompiledKeyword] {
        &self.keywords
    }

    pub(crate) fn keyword(&self, name: &str) -> Option<&CompiledKeyword> {
        self.keywords.iter().find(|kw| kw.name == name)
    }

    pub fn dynamic_anchor(&self) -> Option<&str> {
        self.dynamic_anchor.as_deref()
    }

    pub fn recursive_anchor(&self) -> bool {
        self.recursive_anchor
    }

    /// The absolute URI of this node: base URI plus location fragment.
    pub fn schema_uri(&self) -> Url {
        let mut uri = self.base_uri.clone();
        uri.set_fragment(Some(&self.location.to_string()));
        uri
    }
}

/// Everything one compilation pass produced, ready for the registry to
/// index.
pub(crate) struct CompiledDocument {
    pub root: Schema,
    /// Resource roots, including embedded `$id` resources.
    pub resources: Vec<(Url, Schema)>,
    /// Every compiled subschema: (resource URI, RFC 6901 pointer, schema).
    pub locations: Vec<(Url, String, Schema)>,
    pub anchors: Vec<(Url, String, Schema)>,
    pub dynamic_anchors: Vec<(Url, String, Schema)>,
    /// Absolute targets of every `$ref` / `$dynamicRef` in the document.
    pub references: Vec<Url>,
}

/// Compile a schema document rooted at `base_uri` under `draft`.
pub(crate) fn compile_document(
    document: &Value,
    base_uri: &Url,
    draft: Draft,
) -> Result<CompiledDocument, Error> {
    let mut compiler = Compiler {
        draft,
        resources: Vec::new(),
        locations: Vec::new(),
        anchors: Vec::new(),
        dynamic_anchors: Vec::new(),
        references: Vec::new(),
    };
    let root = compiler.compile(document, base_uri, JsonPointer::root())?;
    Ok(CompiledDocument {
        root,
        resources: compiler.resources,
        locations: compiler.locations,
        anchors: compiler.anchors,
        dynamic_anchors: compiler.dynamic_anchors,
        references: compiler.references,
    })
}

struct Compiler {
    draft: Draft,
    resources: Vec<(Url, Schema)>,
    locations: Vec<(Url, String, Schema)>,
    anchors: Vec<(Url, String, Schema)>,
    dynamic_anchors: Vec<(Url, String, Schema)>,
    references: Vec<Url>,
}

impl Compiler {
    fn compile(&mut self, value: &Value, base: &Url, location: JsonPointer) -> Result<Schema, Error> {
        match value {
            Value::Bool(b) => {
                let schema = Schema::Bool(*b);
                self.locations
                    .push((base.clone(), location.to_string(), schema.clone()));
                Ok(schema)
            }
            Value::Object(map) => self.compile_object(map, value, base, location),
            _ => Err(bad(&location, "", "a schema must be a boolean or an object")),
        }
    }

    fn compile_object(
        &mut self,
        map: &Map<String, Value>,
        source: &Value,
        base: &Url,
        location: JsonPointer,
    ) -> Result<Schema, Error> {
        let mut base = base.clone();
        let mut location = location;

        if let Some(id) = map.get("$id") {
            let id = id
                .as_str()
                .ok_or_else(|| bad(&location, "$id", "$id must be a string"))?;
            let mut resolved = base
                .join(id)
                .map_err(|_| bad(&location, "$id", format!("\"{}\" is not a valid URI", id)))?;
            if resolved.fragment().map(|f| !f.is_empty()).unwrap_or(false) {
                return Err(bad(&location, "$id", "$id must not carry a fragment"));
            }
            resolved.set_fragment(None);
            base = resolved;
            location = JsonPointer::root();
        }

        let dynamic_anchor = match map.get("$dynamicAnchor") {
            Some(value) => Some(anchor_name(value, &location, "$dynamicAnchor")?),
            None => None,
        };
        let recursive_anchor = match map.get("$recursiveAnchor") {
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(bad(&location, "$recursiveAnchor", "must be a boolean")),
            None => false,
        };

        let mut keywords = Vec::with_capacity(map.len());
        for (name, value) in map {
            let handler = if vocabulary::applies(name, self.draft) {
                self.compile_keyword(name, value, &base, &location)?
            } else {
                Keyword::Unknown
            };
            keywords.push(CompiledKeyword {
                name: name.clone(),
                value: value.clone(),
                handler,
            });
        }
        keywords.sort_by(|a, b| {
            (a.handler.group(), a.name.as_str()).cmp(&(b.handler.group(), b.name.as_str()))
        });

        let schema = Schema::Object(Arc::new(ObjectSchema {
            base_uri: base.clone(),
            location: location.clone(),
            draft: self.draft,
            keywords,
            dynamic_anchor: dynamic_anchor.clone(),
            recursive_anchor,
            source: source.clone(),
        }));

        self.locations
            .push((base.clone(), location.to_string(), schema.clone()));
        if location.is_empty() {
            self.resources.push((base.clone(), schema.clone()));
        }
        if let Some(anchor) = map.get("$anchor") {
            let anchor = anchor_name(anchor, &location, "$anchor")?;
            self.anchors.push((base.clone(), anchor, schema.clone()));
        }
        if let Some(anchor) = dynamic_anchor {
            self.dynamic_anchors.push((base.clone(), anchor, schema.clone()));
        }

        Ok(schema)
    }

    fn compile_keyword(
        &mut self,
        name: &str,
        value: &Value,
        base: &Url,
        location: &JsonPointer,
    ) -> Result<Keyword, Error> {
        let handler = match name {
            "$id" | "$schema" | "$anchor" | "$dynamicAnchor" | "$recursiveAnchor"
            | "$vocabulary" | "$comment" => Keyword::Identifier,

            "$defs" | "definitions" => {
                let map = expect_object(value, location, name)?;
                let mut defs = Vec::with_capacity(map.len());
                for (def_name, def_value) in map {
                    let sub =
                        self.compile(def_value, base, location.child(name).child(def_name.as_str()))?;
                    defs.push((def_name.clone(), sub));
                }
                Keyword::Defs(defs)
            }

            "$ref" => Keyword::Ref(self.reference(value, base, location, name)?),
            "$dynamicRef" => Keyword::DynamicRef(self.reference(value, base, location, name)?),
            "$recursiveRef" => {
                if value.as_str() != Some("#") {
                    return Err(bad(location, name, "$recursiveRef must be \"#\""));
                }
                Keyword::RecursiveRef
            }

            "type" => Keyword::Type(
                TypeSet::from_value(value).map_err(|reason| bad(location, name, reason))?,
            ),
            "enum" => match value {
                Value::Array(items) => Keyword::Enum(items.clone()),
                _ => return Err(bad(location, name, "enum must be an array")),
            },
            "const" => Keyword::Const(value.clone()),

            "minLength" => Keyword::MinLength(expect_count(value, location, name)?),
            "maxLength" => Keyword::MaxLength(expect_count(value, location, name)?),
            "pattern" => Keyword::Pattern(expect_regex(value, location, name)?),
            "minimum" => Keyword::Minimum(expect_number(value, location, name)?),
            "maximum" => Keyword::Maximum(expect_number(value, location, name)?),
            "exclusiveMinimum" => Keyword::ExclusiveMinimum(expect_number(value, location, name)?),
            "exclusiveMaximum" => Keyword::ExclusiveMaximum(expect_number(value, location, name)?),
            "multipleOf" => {
                let factor = expect_number(value, location, name)?;
                if factor <= 0.0 {
                    return Err(bad(location, name, "multipleOf must be greater than zero"));
                }
                Keyword::MultipleOf(factor)
            }
            "minItems" => Keyword::MinItems(expect_count(value, location, name)?),
            "maxItems" => Keyword::MaxItems(expect_count(value, location, name)?),
            "uniqueItems" => match value {
                Value::Bool(b) => Keyword::UniqueItems(*b),
                _ => return Err(bad(location, name, "uniqueItems must be a boolean")),
            },
            "minProperties" => Keyword::MinProperties(expect_count(value, location, name)?),
            "maxProperties" => Keyword::MaxProperties(expect_count(value, location, name)?),
            "required" => Keyword::Required(expect_string_array(value, location, name)?),
            "dependentRequired" => {
                let map = expect_object(value, location, name)?;
                let mut dependencies = Vec::with_capacity(map.len());
                for (property, needed) in map {
                    dependencies
                        .push((property.clone(), expect_string_array(needed, location, name)?));
                }
                Keyword::DependentRequired(dependencies)
            }
            "minContains" => Keyword::MinContains(expect_count(value, location, name)?),
            "maxContains" => Keyword::MaxContains(expect_count(value, location, name)?),

            "allOf" => Keyword::AllOf(self.subschema_list(value, base, location, name)?),
            "anyOf" => Keyword::AnyOf(self.subschema_list(value, base, location, name)?),
            "oneOf" => Keyword::OneOf(self.subschema_list(value, base, location, name)?),
            "not" => Keyword::Not(self.compile(value, base, location.child(name))?),
            "if" => Keyword::If(self.compile(value, base, location.child(name))?),
            "then" => Keyword::Then(self.compile(value, base, location.child(name))?),
            "else" => Keyword::Else(self.compile(value, base, location.child(name))?),
            "dependentSchemas" => {
                Keyword::DependentSchemas(self.subschema_map(value, base, location, name)?)
            }

            "properties" => Keyword::Properties(self.subschema_map(value, base, location, name)?),
            "patternProperties" => {
                let map = expect_object(value, location, name)?;
                let mut patterns = Vec::with_capacity(map.len());
                for (pattern, sub_value) in map {
                    let regex = Regex::new(pattern).map_err(|_| {
                        bad(location, name, format!("\"{}\" is not a valid pattern", pattern))
                    })?;
                    let sub =
                        self.compile(sub_value, base, location.child(name).child(pattern.as_str()))?;
                    patterns.push((pattern.clone(), regex, sub));
                }
                Keyword::PatternProperties(patterns)
            }
            "additionalProperties" => {
                Keyword::AdditionalProperties(self.compile(value, base, location.child(name))?)
            }
            "propertyNames" => {
                Keyword::PropertyNames(self.compile(value, base, location.child(name))?)
            }
            "prefixItems" => Keyword::PrefixItems(self.subschema_list(value, base, location, name)?),
            "items" => match (self.draft, value) {
                (Draft::Draft201909, Value::Array(_)) => {
                    Keyword::TupleItems(self.subschema_list(value, base, location, name)?)
                }
                (Draft::Draft202012, Value::Array(_)) => {
                    return Err(bad(location, name, "items must be a schema; use prefixItems for tuples"))
                }
                _ => Keyword::Items(self.compile(value, base, location.child(name))?),
            },
            "additionalItems" => {
                Keyword::AdditionalItems(self.compile(value, base, location.child(name))?)
            }
            "contains" => Keyword::Contains(self.compile(value, base, location.child(name))?),

            "unevaluatedProperties" => {
                Keyword::UnevaluatedProperties(self.compile(value, base, location.child(name))?)
            }
            "unevaluatedItems" => {
                Keyword::UnevaluatedItems(self.compile(value, base, location.child(name))?)
            }

            "format" => match value {
                Value::String(format) => Keyword::Format(format.clone()),
                _ => return Err(bad(location, name, "format must be a string")),
            },
            "contentSchema" => {
                Keyword::ContentSchema(self.compile(value, base, location.child(name))?)
            }
            "title" | "description" | "default" | "examples" | "deprecated" | "readOnly"
            | "writeOnly" | "contentMediaType" | "contentEncoding" => Keyword::Annotation,

            _ => Keyword::Unknown,
        };
        Ok(handler)
    }

    fn reference(
        &mut self,
        value: &Value,
        base: &Url,
        location: &JsonPointer,
        name: &str,
    ) -> Result<Url, Error> {
        let target = value
            .as_str()
            .ok_or_else(|| bad(location, name, format!("{} must be a string", name)))?;
        let resolved = base
            .join(target)
            .map_err(|_| bad(location, name, format!("\"{}\" is not a valid URI reference", target)))?;
        self.references.push(resolved.clone());
        Ok(resolved)
    }

    fn subschema_list(
        &mut self,
        value: &Value,
        base: &Url,
        location: &JsonPointer,
        name: &str,
    ) -> Result<Vec<Schema>, Error> {
        let items = match value {
            Value::Array(items) if !items.is_empty() => items,
            _ => return Err(bad(location, name, format!("{} must be a non-empty array", name))),
        };
        let mut subs = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            subs.push(self.compile(item, base, location.child(name).child(index))?);
        }
        Ok(subs)
    }

    fn subschema_map(
        &mut self,
        value: &Value,
        base: &Url,
        location: &JsonPointer,
        name: &str,
    ) -> Result<Vec<(String, Schema)>, Error> {
        let map = expect_object(value, location, name)?;
        let mut subs = Vec::with_capacity(map.len());
        for (key, sub_value) in map {
            let sub = self.compile(sub_value, base, location.child(name).child(key.as_str()))?;
            subs.push((key.clone(), sub));
        }
        Ok(subs)
    }
}

fn bad(location: &JsonPointer, name: &str, reason: impl Into<String>) -> Error {
    let location = if name.is_empty() {
        location.to_string()
    } else {
        location.child(name).to_string()
    };
    SchemaError::InvalidSchema {
        location,
        reason: reason.into(),
    }
    .into()
}

fn anchor_name(value: &Value, location: &JsonPointer, name: &str) -> Result<String, Error> {
    let anchor = value
        .as_str()
        .ok_or_else(|| bad(location, name, format!("{} must be a string", name)))?;
    let mut chars = anchor.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic()
                && chars.all(|c| c.is_ascii_alphanumeric() || "-.:_".contains(c))
        }
        None => false,
    };
    if !valid {
        return Err(bad(location, name, format!("\"{}\" is not a valid anchor name", anchor)));
    }
    Ok(anchor.to_owned())
}

fn expect_object<'a>(
    value: &'a Value,
    location: &JsonPointer,
    name: &str,
) -> Result<&'a Map<String, Value>, Error> {
    value
        .as_object()
        .ok_or_else(|| bad(location, name, format!("{} must be an object", name)))
}

fn expect_number(value: &Value, location: &JsonPointer, name: &str) -> Result<f64, Error> {
    value
        .as_f64()
        .ok_or_else(|| bad(location, name, format!("{} must be a number", name)))
}

fn expect_count(value: &Value, location: &JsonPointer, name: &str) -> Result<u64, Error> {
    if let Some(count) = value.as_u64() {
        return Ok(count);
    }
    // Integral floats are accepted, matching number equality semantics.
    if let Some(f) = value.as_f64() {
        if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
            return Ok(f as u64);
        }
    }
    Err(bad(location, name, format!("{} must be a non-negative integer", name)))
}

fn expect_string_array(
    value: &Value,
    location: &JsonPointer,
    name: &str,
) -> Result<Vec<String>, Error> {
    let items = match value {
        Value::Array(items) => items,
        _ => return Err(bad(location, name, format!("{} must be an array of strings", name))),
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(s) => out.push(s.to_owned()),
            None => return Err(bad(location, name, format!("{} must be an array of strings", name))),
        }
    }
    Ok(out)
}

fn expect_regex(value: &Value, location: &JsonPointer, name: &str) -> Result<Regex, Error> {
    let pattern = value
        .as_str()
        .ok_or_else(|| bad(location, name, format!("{} must be a string", name)))?;
    Regex::new(pattern)
        .map_err(|_| bad(location, name, format!("\"{}\" is not a valid pattern", pattern)))
}
