//! Built-in vocabularies, draft detection, and the optional meta-schema
//! validation pass.

use failure::{bail, Error};
use serde_json::Value;

use crate::errors::SchemaError;
use crate::options::ValidationOptions;
use crate::results::ValidationResults;
use crate::schema::Draft;
use crate::vm;

/// A named set of keywords, as carried by `$vocabulary`.
#[derive(Debug, Clone, Copy)]
pub struct Vocabulary {
    pub id: &'static str,
    pub keywords: &'static [&'static str],
}

const VALIDATION: &[&str] = &[
    "type",
    "enum",
    "const",
    "multipleOf",
    "maximum",
    "exclusiveMaximum",
    "minimum",
    "exclusiveMinimum",
    "maxLength",
    "minLength",
    "pattern",
    "maxItems",
    "minItems",
    "uniqueItems",
    "maxContains",
    "minContains",
    "maxProperties",
    "minProperties",
    "required",
    "dependentRequired",
];

const META_DATA: &[&str] = &[
    "title",
    "description",
    "default",
    "deprecated",
    "readOnly",
    "writeOnly",
    "examples",
];

const CONTENT: &[&str] = &["contentMediaType", "contentEncoding", "contentSchema"];

/// `definitions` is carried alongside `$defs` in both drafts so legacy
/// documents keep resolving.
const VOCABULARIES_2019: &[Vocabulary] = &[
    Vocabulary {
        id: "https://json-schema.org/draft/2019-09/vocab/core",
        keywords: &[
            "$id",
            "$schema",
            "$anchor",
            "$recursiveRef",
            "$recursiveAnchor",
            "$ref",
            "$defs",
            "definitions",
            "$comment",
            "$vocabulary",
        ],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2019-09/vocab/applicator",
        keywords: &[
            "allOf",
            "anyOf",
            "oneOf",
            "not",
            "if",
            "then",
            "else",
            "dependentSchemas",
            "items",
            "additionalItems",
            "contains",
            "properties",
            "patternProperties",
            "additionalProperties",
            "propertyNames",
            "unevaluatedProperties",
            "unevaluatedItems",
        ],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2019-09/vocab/validation",
        keywords: VALIDATION,
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2019-09/vocab/meta-data",
        keywords: META_DATA,
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2019-09/vocab/format",
        keywords: &["format"],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2019-09/vocab/content",
        keywords: CONTENT,
    },
];

const VOCABULARIES_2020: &[Vocabulary] = &[
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/core",
        keywords: &[
            "$id",
            "$schema",
            "$anchor",
            "$dynamicRef",
            "$dynamicAnchor",
            "$ref",
            "$defs",
            "definitions",
            "$comment",
            "$vocabulary",
        ],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/applicator",
        keywords: &[
            "allOf",
            "anyOf",
            "oneOf",
            "not",
            "if",
            "then",
            "else",
            "dependentSchemas",
            "prefixItems",
            "items",
            "contains",
            "properties",
            "patternProperties",
            "additionalProperties",
            "propertyNames",
        ],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/unevaluated",
        keywords: &["unevaluatedItems", "unevaluatedProperties"],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/validation",
        keywords: VALIDATION,
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/meta-data",
        keywords: META_DATA,
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/format-annotation",
        keywords: &["format"],
    },
    Vocabulary {
        id: "https://json-schema.org/draft/2020-12/vocab/content",
        keywords: CONTENT,
    },
];

/// The built-in vocabularies of a draft.
pub fn vocabularies(draft: Draft) -> &'static [Vocabulary] {
    match draft {
        Draft::Draft201909 => VOCABULARIES_2019,
        Draft::Draft202012 => VOCABULARIES_2020,
    }
}

/// Whether `keyword` is defined by any vocabulary of `draft`. Keywords
/// that are not degrade to annotations.
pub fn applies(keyword: &str, draft: Draft) -> bool {
    vocabularies(draft)
        .iter()
        .any(|vocabulary| vocabulary.keywords.contains(&keyword))
}

/// Detect the draft a document declares through `$schema`.
pub fn detect_draft(document: &Value) -> Option<Draft> {
    let declared = document.get("$schema")?.as_str()?;
    let declared = declared.strip_suffix('#').unwrap_or(declared);
    for draft in [Draft::Draft201909, Draft::Draft202012] {
        if declared == draft.meta_schema_uri() {
            return Some(draft);
        }
    }
    None
}

/// Validate a schema document against its declared meta-schema.
///
/// The meta-schema must be resolvable through the options' registry
/// (registered directly, or reachable through its resolver); meta-schema
/// documents are not bundled with this crate. Documents with no
/// `$schema` are checked against the draft forced by the options, or
/// 2020-12.
pub fn meta_validate(
    document: &Value,
    options: &ValidationOptions,
) -> Result<ValidationResults, Error> {
    let declared = match document.get("$schema") {
        Some(declared) => match declared.as_str() {
            Some(declared) => declared.to_owned(),
            None => bail!(SchemaError::InvalidSchema {
                location: "/$schema".to_owned(),
                reason: "$schema must be a string".to_owned(),
            }),
        },
        None => options
            .get_evaluate_as()
            .unwrap_or_default()
            .meta_schema_uri()
            .to_owned(),
    };
    let uri = declared
        .parse()
        .map_err(|_| SchemaError::UnresolvedReference { uri: declared.clone() })?;
    let meta_schema = options.registry().resolve(&uri)?;
    Ok(vm::validate(&meta_schema, document, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn draft_detection_reads_schema() {
        assert_eq!(
            detect_draft(&json!({"$schema": "https://json-schema.org/draft/2019-09/schema"})),
            Some(Draft::Draft201909)
        );
        assert_eq!(
            detect_draft(&json!({"$schema": "https://json-schema.org/draft/2020-12/schema#"})),
            Some(Draft::Draft202012)
        );
        assert_eq!(detect_draft(&json!({"type": "object"})), None);
        assert_eq!(detect_draft(&json!({"$schema": "https://example.com/other"})), None);
    }

    #[test]
    fn applicability_is_draft_gated() {
        assert!(applies("prefixItems", Draft::Draft202012));
        assert!(!applies("prefixItems", Draft::Draft201909));
        assert!(applies("additionalItems", Draft::Draft201909));
        assert!(!applies("additionalItems", Draft::Draft202012));
        assert!(applies("$recursiveRef", Draft::Draft201909));
        assert!(!applies("$recursiveRef", Draft::Draft202012));
        assert!(applies("$dynamicRef", Draft::Draft202012));
        assert!(applies("unevaluatedProperties", Draft::Draft201909));
        assert!(applies("unevaluatedProperties", Draft::Draft202012));
        assert!(!applies("frobnicate", Draft::Draft202012));
    }

    #[test]
    fn every_vocabulary_keyword_is_unique_within_its_draft() {
        for draft in [Draft::Draft201909, Draft::Draft202012] {
            let mut seen = std::collections::HashSet::new();
            for vocabulary in vocabularies(draft) {
                for keyword in vocabulary.keywords {
                    assert!(seen.insert(*keyword), "{} duplicated", keyword);
                }
            }
        }
    }
}
