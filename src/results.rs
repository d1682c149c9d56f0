//! Validation result trees.
//!
//! A [`ValidationResults`](struct.ValidationResults.html) node is
//! produced for every subschema the evaluator applies; the root of the
//! tree is what [`validate`](../validator/fn.validate.html) returns.
//! Valid nodes carry annotations, invalid nodes carry errors keyed by
//! the keyword that produced them (the empty key is the node's overall
//! message). The tree serializes to three shapes and can be reduced in
//! place to the `basic` and `flag` formats.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use url::Url;

use crate::options::{OutputFormat, OutputStyle};
use crate::pointer::JsonPointer;

/// One node of a validation result tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResults {
    pub(crate) valid: bool,
    pub(crate) evaluation_path: JsonPointer,
    pub(crate) schema_location: Option<Url>,
    pub(crate) instance_location: JsonPointer,
    pub(crate) nested: Vec<ValidationResults>,
    pub(crate) annotations: Map<String, Value>,
    pub(crate) errors: Map<String, Value>,
    pub(crate) exclude: bool,
    pub(crate) format: OutputFormat,
}

impl ValidationResults {
    pub(crate) fn new(
        evaluation_path: JsonPointer,
        instance_location: JsonPointer,
        format: OutputFormat,
    ) -> ValidationResults {
        ValidationResults {
            valid: true,
            evaluation_path,
            schema_location: None,
            instance_location,
            nested: Vec::new(),
            annotations: Map::new(),
            errors: Map::new(),
            exclude: false,
            format,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Pointer from the root schema to the keyword application that
    /// produced this node.
    pub fn evaluation_path(&self) -> &JsonPointer {
        &self.evaluation_path
    }

    /// Absolute URI of the schema this node evaluated, when known.
    pub fn schema_location(&self) -> Option<&Url> {
        self.schema_location.as_ref()
    }

    /// Pointer from the root instance to the value this node evaluated.
    pub fn instance_location(&self) -> &JsonPointer {
        &self.instance_location
    }

    pub fn nested(&self) -> &[ValidationResults] {
        &self.nested
    }

    /// Annotations produced at this node, keyed by keyword.
    pub fn annotations(&self) -> &Map<String, Value> {
        &self.annotations
    }

    /// Errors recorded at this node, keyed by keyword; the empty key is
    /// the node's overall message.
    pub fn errors(&self) -> &Map<String, Value> {
        &self.errors
    }

    /// Suppress this node (and its subtree) from serialization.
    pub fn exclude(&mut self) {
        self.exclude = true;
    }

    pub fn is_excluded(&self) -> bool {
        self.exclude
    }

    /// Record an annotation. Within a node the last writer wins.
    pub(crate) fn annotate(&mut self, keyword: &str, value: Value) {
        self.annotations.insert(keyword.to_owned(), value);
    }

    /// Record an error for `keyword` and mark the node invalid.
    ///
    /// `{token}` placeholders in `template` are replaced from
    /// `substitutions`; unknown tokens are left intact.
    pub(crate) fn fail(&mut self, keyword: &str, template: &str, substitutions: &[(&str, String)]) {
        let mut message = template.to_owned();
        for (token, value) in substitutions {
            message = message.replace(&format!("{{{}}}", token), value);
        }
        self.errors.insert(keyword.to_owned(), Value::String(message));
        self.valid = false;
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.valid = false;
    }

    pub(crate) fn set_schema_location(&mut self, uri: Url) {
        self.schema_location = Some(uri);
    }

    pub(crate) fn push_nested(&mut self, child: ValidationResults) {
        self.nested.push(child);
    }

    /// Collect annotation values for `keys` from this node and from
    /// every transitively nested valid result at the same instance
    /// location. Descent stops where the instance location changes,
    /// which is exactly at child applicators.
    pub(crate) fn gathered_annotations<'a>(&'a self, keys: &[&str]) -> Vec<&'a Value> {
        let mut out = Vec::new();
        for key in keys {
            if let Some(value) = self.annotations.get(*key) {
                out.push(value);
            }
        }
        for child in &self.nested {
            child.gather(keys, &self.instance_location, &mut out);
        }
        out
    }

    fn gather<'a>(&'a self, keys: &[&str], location: &JsonPointer, out: &mut Vec<&'a Value>) {
        if !self.valid || self.instance_location != *location {
            return;
        }
        for key in keys {
            if let Some(value) = self.annotations.get(*key) {
                out.push(value);
            }
        }
        for child in &self.nested {
            child.gather(keys, location, out);
        }
    }

    /// Flatten the tree in place into the `basic` format: every
    /// descendant whose validity matches the root's and which carries
    /// errors (invalid case) or annotations (valid case) is lifted into
    /// a single-level list, headed by the root's own entry.
    pub fn to_basic(&mut self) {
        if self.format == OutputFormat::Basic {
            return;
        }
        let root_valid = self.valid;
        let mut flat = Vec::new();
        if (root_valid && !self.annotations.is_empty())
            || (!root_valid && !self.errors.is_empty())
        {
            let mut unit = self.clone();
            unit.nested = Vec::new();
            unit.format = OutputFormat::Basic;
            flat.push(unit);
        }
        let nested = std::mem::take(&mut self.nested);
        for child in &nested {
            Self::flatten(child, root_valid, &mut flat);
        }
        self.annotations = Map::new();
        self.errors = Map::new();
        self.schema_location = None;
        self.nested = flat;
        self.format = OutputFormat::Basic;
    }

    fn flatten(node: &ValidationResults, root_valid: bool, out: &mut Vec<ValidationResults>) {
        if node.exclude {
            return;
        }
        if node.valid == root_valid {
            let carries = if root_valid {
                !node.annotations.is_empty()
            } else {
                !node.errors.is_empty()
            };
            if carries {
                let mut unit = node.clone();
                unit.nested = Vec::new();
                unit.format = OutputFormat::Basic;
                out.push(unit);
            }
        }
        for child in &node.nested {
            Self::flatten(child, root_valid, out);
        }
    }

    /// Reduce the tree in place to the `flag` format: only the verdict
    /// remains.
    pub fn to_flag(&mut self) {
        self.nested.clear();
        self.annotations = Map::new();
        self.errors = Map::new();
        self.format = OutputFormat::Flag;
    }

    /// Render this tree in the requested output style.
    pub fn serialize(&self, style: OutputStyle) -> Value {
        match style {
            OutputStyle::Post2020 => self.serialize_post2020(true),
            OutputStyle::Pre2020 => self.serialize_pre2020(),
        }
    }

    fn serialize_post2020(&self, is_root: bool) -> Value {
        if self.format == OutputFormat::Flag {
            let mut obj = Map::new();
            obj.insert("valid".to_owned(), Value::Bool(self.valid));
            return Value::Object(obj);
        }
        let mut obj = Map::new();
        obj.insert("valid".to_owned(), Value::Bool(self.valid));
        if !is_root || self.format == OutputFormat::Hierarchical {
            obj.insert(
                "evaluationPath".to_owned(),
                Value::String(self.evaluation_path.to_string()),
            );
        }
        if let Some(location) = &self.schema_location {
            obj.insert("schemaLocation".to_owned(), Value::String(location.to_string()));
        }
        obj.insert(
            "instanceLocation".to_owned(),
            Value::String(self.instance_location.to_string()),
        );
        if self.valid && !self.annotations.is_empty() {
            obj.insert("annotations".to_owned(), Value::Object(self.annotations.clone()));
        }
        if !self.valid && !self.errors.is_empty() {
            obj.insert("errors".to_owned(), Value::Object(self.errors.clone()));
        }
        let nested: Vec<Value> = self
            .nested
            .iter()
            .filter(|child| !child.exclude)
            .map(|child| child.serialize_post2020(false))
            .collect();
        if !nested.is_empty() {
            obj.insert("nested".to_owned(), Value::Array(nested));
        }
        Value::Object(obj)
    }

    fn serialize_pre2020(&self) -> Value {
        if self.format == OutputFormat::Flag {
            let mut obj = Map::new();
            obj.insert("valid".to_owned(), Value::Bool(self.valid));
            return Value::Object(obj);
        }
        let mut obj = Map::new();
        obj.insert("valid".to_owned(), Value::Bool(self.valid));
        obj.insert(
            "keywordLocation".to_owned(),
            Value::String(self.evaluation_path.to_string()),
        );
        if let Some(location) = &self.schema_location {
            obj.insert(
                "absoluteKeywordLocation".to_owned(),
                Value::String(location.to_string()),
            );
        }
        obj.insert(
            "instanceLocation".to_owned(),
            Value::String(self.instance_location.to_string()),
        );

        if !self.valid {
            if let Some(Value::String(message)) = self.errors.get("") {
                obj.insert("error".to_owned(), Value::String(message.clone()));
            }
            let mut entries: Vec<Value> = self
                .nested
                .iter()
                .filter(|child| !child.exclude && !child.valid)
                .map(|child| child.serialize_pre2020())
                .collect();
            for (keyword, message) in &self.errors {
                if keyword.is_empty() {
                    continue;
                }
                let mut entry = Map::new();
                entry.insert(
                    "keywordLocation".to_owned(),
                    Value::String(self.evaluation_path.child(keyword.as_str()).to_string()),
                );
                if let Some(location) = self.keyword_location(keyword) {
                    entry.insert("absoluteKeywordLocation".to_owned(), Value::String(location));
                }
                entry.insert(
                    "instanceLocation".to_owned(),
                    Value::String(self.instance_location.to_string()),
                );
                entry.insert("error".to_owned(), message.clone());
                entries.push(Value::Object(entry));
            }
            if !entries.is_empty() {
                obj.insert("errors".to_owned(), Value::Array(entries));
            }
        } else {
            let mut entries: Vec<Value> = self
                .nested
                .iter()
                .filter(|child| !child.exclude && child.valid)
                .map(|child| child.serialize_pre2020())
                .collect();
            for (keyword, value) in &self.annotations {
                let mut entry = Map::new();
                entry.insert(
                    "keywordLocation".to_owned(),
                    Value::String(self.evaluation_path.child(keyword.as_str()).to_string()),
                );
                if let Some(location) = self.keyword_location(keyword) {
                    entry.insert("absoluteKeywordLocation".to_owned(), Value::String(location));
                }
                entry.insert(
                    "instanceLocation".to_owned(),
                    Value::String(self.instance_location.to_string()),
                );
                entry.insert("annotation".to_owned(), value.clone());
                entries.push(Value::Object(entry));
            }
            if !entries.is_empty() {
                obj.insert("annotations".to_owned(), Value::Array(entries));
            }
        }
        Value::Object(obj)
    }

    /// The node's absolute location with `/keyword` appended to the
    /// fragment.
    fn keyword_location(&self, keyword: &str) -> Option<String> {
        self.schema_location.as_ref().map(|uri| {
            let mut uri = uri.clone();
            let suffix = JsonPointer::root().child(keyword).to_string();
            let fragment = format!("{}{}", uri.fragment().unwrap_or(""), suffix);
            uri.set_fragment(Some(&fragment));
            uri.to_string()
        })
    }
}

impl Serialize for ValidationResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.serialize_post2020(true).serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(path: &str, instance: &str, format: OutputFormat) -> ValidationResults {
        ValidationResults::new(path.parse().unwrap(), instance.parse().unwrap(), format)
    }

    fn sample_tree() -> ValidationResults {
        let mut root = node("", "", OutputFormat::Hierarchical);
        root.set_schema_location("https://example.com/s#".parse().unwrap());
        root.annotate("title", json!("root"));
        let mut child = node("/properties/a", "/a", OutputFormat::Hierarchical);
        child.set_schema_location("https://example.com/s#/properties/a".parse().unwrap());
        child.annotate("title", json!("leaf"));
        root.push_nested(child);
        root
    }

    #[test]
    fn message_templating_replaces_known_tokens() {
        let mut results = node("", "", OutputFormat::Hierarchical);
        results.fail(
            "minLength",
            "expected at least {expected} characters, found {found} in {unknown}",
            &[("expected", "2".to_owned()), ("found", "1".to_owned())],
        );
        assert_eq!(
            results.errors().get("minLength"),
            Some(&json!("expected at least 2 characters, found 1 in {unknown}"))
        );
        assert!(!results.is_valid());
    }

    #[test]
    fn to_flag_drops_everything_but_the_verdict() {
        let mut results = sample_tree();
        results.fail("", "boom", &[]);
        results.to_flag();
        assert_eq!(results.serialize(OutputStyle::Post2020), json!({"valid": false}));
        let before = results.clone();
        results.to_flag();
        assert_eq!(results, before);
    }

    #[test]
    fn to_basic_lifts_matching_descendants_behind_the_root_entry() {
        let mut results = sample_tree();
        results.to_basic();
        assert_eq!(results.nested.len(), 2);
        assert_eq!(results.nested[0].evaluation_path().to_string(), "");
        assert_eq!(results.nested[0].annotations().get("title"), Some(&json!("root")));
        assert!(results.nested[0].nested().is_empty());
        assert_eq!(results.nested[1].evaluation_path().to_string(), "/properties/a");
        assert!(results.annotations().is_empty());

        let before = results.clone();
        results.to_basic();
        assert_eq!(results, before);
    }

    #[test]
    fn to_basic_keeps_only_error_carriers_when_invalid() {
        let mut root = node("", "", OutputFormat::Hierarchical);
        let mut bad = node("/allOf/0", "", OutputFormat::Hierarchical);
        bad.fail("type", "wrong type", &[]);
        let good = node("/allOf/1", "", OutputFormat::Hierarchical);
        root.push_nested(bad);
        root.push_nested(good);
        root.fail("allOf", "1 of 2 subschemas failed to validate", &[]);

        root.to_basic();
        assert_eq!(root.nested.len(), 2);
        assert_eq!(root.nested[0].errors().get("allOf"), Some(&json!("1 of 2 subschemas failed to validate")));
        assert_eq!(root.nested[1].errors().get("type"), Some(&json!("wrong type")));
    }

    #[test]
    fn hierarchical_serialization_follows_the_contract() {
        let results = sample_tree();
        assert_eq!(
            results.serialize(OutputStyle::Post2020),
            json!({
                "valid": true,
                "evaluationPath": "",
                "schemaLocation": "https://example.com/s#",
                "instanceLocation": "",
                "annotations": {"title": "root"},
                "nested": [{
                    "valid": true,
                    "evaluationPath": "/properties/a",
                    "schemaLocation": "https://example.com/s#/properties/a",
                    "instanceLocation": "/a",
                    "annotations": {"title": "leaf"}
                }]
            })
        );
    }

    #[test]
    fn excluded_nodes_are_omitted() {
        let mut results = sample_tree();
        results.nested[0].exclude();
        let rendered = results.serialize(OutputStyle::Post2020);
        assert!(rendered.get("nested").is_none());
    }

    #[test]
    fn pre2020_invalid_nodes_expand_error_entries() {
        let mut results = node("", "", OutputFormat::Hierarchical);
        results.set_schema_location("https://example.com/s#".parse().unwrap());
        results.fail("", "instance rejected", &[]);
        results.fail("type", "Value is not integer", &[]);
        assert_eq!(
            results.serialize(OutputStyle::Pre2020),
            json!({
                "valid": false,
                "keywordLocation": "",
                "absoluteKeywordLocation": "https://example.com/s#",
                "instanceLocation": "",
                "error": "instance rejected",
                "errors": [{
                    "keywordLocation": "/type",
                    "absoluteKeywordLocation": "https://example.com/s#/type",
                    "instanceLocation": "",
                    "error": "Value is not integer"
                }]
            })
        );
    }

    #[test]
    fn pre2020_valid_nodes_interleave_children_before_annotations() {
        let results = sample_tree();
        let rendered = results.serialize(OutputStyle::Pre2020);
        let annotations = rendered.get("annotations").unwrap().as_array().unwrap();
        // Nested result first, leftover annotation object second.
        assert_eq!(annotations[0].get("keywordLocation"), Some(&json!("/properties/a")));
        assert_eq!(annotations[1].get("annotation"), Some(&json!("root")));
        assert_eq!(annotations[1].get("keywordLocation"), Some(&json!("/title")));
    }
}
