//! The keyword set: one handler variant per keyword, with its compiled
//! payload.
//!
//! Compilation (see [`schema`](../schema/index.html)) parses each
//! keyword's value into the matching [`Keyword`] variant and binds any
//! subschemas; evaluation dispatches on the variant. Keywords execute in
//! [`group`](enum.Keyword.html#method.group) order, name-sorted within a
//! group, so identifiers come first, references next, then assertions,
//! in-place applicators, child applicators, the unevaluated pair last
//! but one, and pure annotations at the end.

use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::schema::Schema;

/// A keyword bound to its handler, as stored on a compiled schema.
#[derive(Debug)]
pub struct CompiledKeyword {
    /// The keyword name as written in the schema.
    pub name: String,
    /// The raw keyword value, kept for annotations and serialization.
    pub value: Value,
    pub handler: Keyword,
}

/// What a keyword contributes to evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    /// Consumed at compile time; a no-op during evaluation.
    Identifier,
    /// Delegates evaluation to a referenced schema.
    Reference,
    /// Constrains the instance directly.
    Assertion,
    /// Applies subschemas, in place or to children of the instance.
    Applicator,
    /// Produces an annotation and never fails.
    Annotation,
}

/// A compiled keyword handler.
///
/// Variants carry whatever their evaluation needs: bounds as numbers,
/// patterns pre-compiled, subschemas bound. Keywords that modify a
/// sibling (`minContains`, `then`) still get their own variant; the
/// sibling's handler looks them up on the shared schema node.
#[derive(Debug)]
pub enum Keyword {
    /// `$id`, `$schema`, `$anchor`, `$dynamicAnchor`, `$recursiveAnchor`,
    /// `$vocabulary`, `$comment` — consumed at compile time.
    Identifier,
    /// `$defs` / legacy `definitions`: compiled so anchors and refs into
    /// them resolve, otherwise inert.
    Defs(Vec<(String, Schema)>),

    /// `$ref`, resolved to an absolute URI at compile time.
    Ref(Url),
    /// `$recursiveRef` (2019-09); its value is always `#`.
    RecursiveRef,
    /// `$dynamicRef` (2020-12), resolved to an absolute URI at compile
    /// time; the fragment names the dynamic anchor.
    DynamicRef(Url),

    Type(TypeSet),
    Enum(Vec<Value>),
    Const(Value),

    MinLength(u64),
    MaxLength(u64),
    Pattern(Regex),
    Minimum(f64),
    Maximum(f64),
    ExclusiveMinimum(f64),
    ExclusiveMaximum(f64),
    MultipleOf(f64),
    MinItems(u64),
    MaxItems(u64),
    UniqueItems(bool),
    MinProperties(u64),
    MaxProperties(u64),
    Required(Vec<String>),
    DependentRequired(Vec<(String, Vec<String>)>),
    /// Sibling modifiers of `contains`.
    MinContains(u64),
    MaxContains(u64),

    AllOf(Vec<Schema>),
    AnyOf(Vec<Schema>),
    OneOf(Vec<Schema>),
    Not(Schema),
    If(Schema),
    /// Driven by the sibling `if`; inert on its own.
    Then(Schema),
    Else(Schema),
    DependentSchemas(Vec<(String, Schema)>),

    Properties(Vec<(String, Schema)>),
    PatternProperties(Vec<(String, Regex, Schema)>),
    AdditionalProperties(Schema),
    PropertyNames(Schema),
    /// 2020-12 tuple prefix.
    PrefixItems(Vec<Schema>),
    /// 2020-12 rest-items, and the 2019-09 single-schema `items`.
    Items(Schema),
    /// 2019-09 `items` in its array form.
    TupleItems(Vec<Schema>),
    /// 2019-09 companion to [`TupleItems`](#variant.TupleItems).
    AdditionalItems(Schema),
    Contains(Schema),

    UnevaluatedProperties(Schema),
    UnevaluatedItems(Schema),

    /// `title`, `description`, `default`, `examples`, `deprecated`,
    /// `readOnly`, `writeOnly`, `contentMediaType`, `contentEncoding`:
    /// the raw value becomes the annotation.
    Annotation,
    /// `contentSchema`: annotated verbatim, but the subschema is compiled
    /// so identifiers inside it register.
    ContentSchema(Schema),
    Format(String),
    /// Any keyword this draft does not define; retained verbatim as an
    /// annotation.
    Unknown,
}

impl Keyword {
    /// The execution group (1–8). Groups run in ascending order; within a
    /// group, keywords run in name order.
    pub fn group(&self) -> u8 {
        match self {
            Keyword::Identifier | Keyword::Defs(_) => 1,
            Keyword::Ref(_) | Keyword::RecursiveRef | Keyword::DynamicRef(_) => 2,
            Keyword::Type(_) | Keyword::Enum(_) | Keyword::Const(_) => 3,
            Keyword::MinLength(_)
            | Keyword::MaxLength(_)
            | Keyword::Pattern(_)
            | Keyword::Minimum(_)
            | Keyword::Maximum(_)
            | Keyword::ExclusiveMinimum(_)
            | Keyword::ExclusiveMaximum(_)
            | Keyword::MultipleOf(_)
            | Keyword::MinItems(_)
            | Keyword::MaxItems(_)
            | Keyword::UniqueItems(_)
            | Keyword::MinProperties(_)
            | Keyword::MaxProperties(_)
            | Keyword::Required(_)
            | Keyword::DependentRequired(_)
            | Keyword::MinContains(_)
            | Keyword::MaxContains(_) => 4,
            Keyword::AllOf(_)
            | Keyword::AnyOf(_)
            | Keyword::OneOf(_)
            | Keyword::Not(_)
            | Keyword::If(_)
            | Keyword::Then(_)
            | Keyword::Else(_)
            | Keyword::DependentSchemas(_) => 5,
            Keyword::Properties(_)
            | Keyword::PatternProperties(_)
            | Keyword::AdditionalProperties(_)
            | Keyword::PropertyNames(_)
            | Keyword::PrefixItems(_)
            | Keyword::Items(_)
            | Keyword::TupleItems(_)
            | Keyword::AdditionalItems(_)
            | Keyword::Contains(_) => 6,
            Keyword::UnevaluatedProperties(_) | Keyword::UnevaluatedItems(_) => 7,
            Keyword::Annotation
            | Keyword::ContentSchema(_)
            | Keyword::Format(_)
            | Keyword::Unknown => 8,
        }
    }

    pub fn kind(&self) -> KeywordKind {
        match self.group() {
            1 => KeywordKind::Identifier,
            2 => KeywordKind::Reference,
            3 | 4 => KeywordKind::Assertion,
            5 | 6 | 7 => KeywordKind::Applicator,
            _ => KeywordKind::Annotation,
        }
    }
}

/// A primitive type named by the `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceType {
    Null,
    Boolean,
    Object,
    Array,
    Number,
    Integer,
    String,
}

impl InstanceType {
    pub fn from_name(name: &str) -> Option<InstanceType> {
        match name {
            "null" => Some(InstanceType::Null),
            "boolean" => Some(InstanceType::Boolean),
            "object" => Some(InstanceType::Object),
            "array" => Some(InstanceType::Array),
            "number" => Some(InstanceType::Number),
            "integer" => Some(InstanceType::Integer),
            "string" => Some(InstanceType::String),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InstanceType::Null => "null",
            InstanceType::Boolean => "boolean",
            InstanceType::Object => "object",
            InstanceType::Array => "array",
            InstanceType::Number => "number",
            InstanceType::Integer => "integer",
            InstanceType::String => "string",
        }
    }

    pub fn matches(self, instance: &Value) -> bool {
        match self {
            InstanceType::Null => instance.is_null(),
            InstanceType::Boolean => instance.is_boolean(),
            InstanceType::Object => instance.is_object(),
            InstanceType::Array => instance.is_array(),
            InstanceType::Number => instance.is_number(),
            InstanceType::String => instance.is_string(),
            InstanceType::Integer => match instance {
                Value::Number(n) => crate::json::is_integer(n),
                _ => false,
            },
        }
    }
}

/// The compiled value of the `type` keyword: one or more primitive types.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSet {
    types: Vec<InstanceType>,
}

impl TypeSet {
    /// Parses a `type` value: a type name or an array of type names.
    pub fn from_value(value: &Value) -> Result<TypeSet, String> {
        let names: Vec<&Value> = match value {
            Value::String(_) => vec![value],
            Value::Array(items) => items.iter().collect(),
            _ => return Err("type must be a string or an array of strings".to_owned()),
        };
        let mut types = Vec::with_capacity(names.len());
        for name in names {
            let name = name
                .as_str()
                .ok_or_else(|| "type must be a string or an array of strings".to_owned())?;
            types.push(
                InstanceType::from_name(name).ok_or(format!("\"{}\" is not a type name", name))?,
            );
        }
        if types.is_empty() {
            return Err("type array must not be empty".to_owned());
        }
        Ok(TypeSet { types })
    }

    pub fn matches(&self, instance: &Value) -> bool {
        self.types.iter().any(|t| t.matches(instance))
    }

    /// Renders the expected types for messages: `integer` or
    /// `one of [string, number]`.
    pub fn describe(&self) -> String {
        match self.types.as_slice() {
            [single] => single.name().to_owned(),
            many => {
                let names: Vec<&str> = many.iter().map(|t| t.name()).collect();
                format!("one of [{}]", names.join(", "))
            }
        }
    }
}
