use jsv::{Draft, OutputFormat, Schema, ValidationOptions, ValidationResults, Validator};
use serde_json::{json, Value};

fn compiled(schema: Value) -> (Validator, Schema) {
    let validator = Validator::new();
    let schema = validator.compile(&schema).expect("schema compiles");
    (validator, schema)
}

fn check(schema: Value, instance: Value) -> ValidationResults {
    let (validator, schema) = compiled(schema);
    validator.validate(&schema, &instance)
}

#[test]
fn type_accepts_integers_and_rejects_fractions() {
    let (validator, schema) = compiled(json!({"type": "integer"}));

    let results = validator.validate(&schema, &json!(3));
    assert!(results.is_valid());
    assert!(results.errors().is_empty());

    let results = validator.validate(&schema, &json!(3.0));
    assert!(results.is_valid());

    let results = validator.validate(&schema, &json!(3.5));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("type"));
}

#[test]
fn all_of_reports_the_failing_branch() {
    let results = check(
        json!({"allOf": [{"type": "string"}, {"minLength": 2}]}),
        json!("a"),
    );
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("allOf"));
    let failing = results
        .nested()
        .iter()
        .find(|child| child.evaluation_path().to_string() == "/allOf/1")
        .expect("branch results present");
    assert!(!failing.is_valid());
    assert!(failing.errors().contains_key("minLength"));
}

#[test]
fn one_of_requires_exactly_one_match() {
    let schema = json!({"oneOf": [{"type": "string"}, {"type": "number"}]});

    let results = check(schema.clone(), json!(true));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("oneOf"));

    let results = check(schema.clone(), json!("x"));
    assert!(results.is_valid());
    let matching = results.nested().iter().filter(|child| child.is_valid()).count();
    assert_eq!(matching, 1);

    // Numbers match both branches when they overlap.
    let results = check(
        json!({"oneOf": [{"type": "number"}, {"minimum": 0}]}),
        json!(1),
    );
    assert!(!results.is_valid());
}

#[test]
fn any_of_accepts_any_match() {
    let schema = json!({"anyOf": [{"type": "string"}, {"minimum": 10}]});
    assert!(check(schema.clone(), json!("x")).is_valid());
    assert!(check(schema.clone(), json!(12)).is_valid());
    assert!(!check(schema, json!(3)).is_valid());
}

#[test]
fn not_negates_and_drops_annotations() {
    let schema = json!({"not": {"type": "string", "title": "inner"}});
    let results = check(schema.clone(), json!(5));
    assert!(results.is_valid());
    assert!(results.annotations().is_empty());
    assert!(!check(schema, json!("s")).is_valid());
}

#[test]
fn conditional_selects_then_or_else() {
    let schema = json!({
        "if": {"required": ["kind"], "properties": {"kind": {"const": "a"}}},
        "then": {"required": ["x"]},
        "else": {"required": ["y"]}
    });
    assert!(check(schema.clone(), json!({"kind": "a", "x": 1})).is_valid());
    assert!(!check(schema.clone(), json!({"kind": "a"})).is_valid());
    assert!(check(schema.clone(), json!({"kind": "b", "y": 1})).is_valid());
    let results = check(schema, json!({"kind": "b"}));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("else"));
}

#[test]
fn dependent_keywords_trigger_on_presence() {
    let schema = json!({"dependentRequired": {"credit": ["billing"]}});
    assert!(check(schema.clone(), json!({"other": 1})).is_valid());
    assert!(!check(schema, json!({"credit": "x"})).is_valid());

    let schema = json!({"dependentSchemas": {"credit": {"required": ["billing"]}}});
    assert!(check(schema.clone(), json!({})).is_valid());
    assert!(!check(schema, json!({"credit": "x"})).is_valid());
}

#[test]
fn structural_assertions_cover_strings_numbers_and_collections() {
    assert!(!check(json!({"minLength": 2}), json!("a")).is_valid());
    assert!(check(json!({"minLength": 2}), json!("日本")).is_valid());
    assert!(!check(json!({"pattern": "^a+$"}), json!("bbb")).is_valid());
    assert!(!check(json!({"maximum": 10}), json!(11)).is_valid());
    assert!(!check(json!({"exclusiveMinimum": 3}), json!(3)).is_valid());
    assert!(check(json!({"multipleOf": 0.5}), json!(2.5)).is_valid());
    assert!(!check(json!({"multipleOf": 3}), json!(7)).is_valid());
    assert!(!check(json!({"uniqueItems": true}), json!([1, 2, 1.0])).is_valid());
    assert!(!check(json!({"minItems": 2}), json!([1])).is_valid());
    assert!(!check(json!({"maxProperties": 1}), json!({"a": 1, "b": 2})).is_valid());
    assert!(!check(json!({"required": ["a"]}), json!({"b": 1})).is_valid());
    assert!(!check(json!({"enum": [1, "two"]}), json!(3)).is_valid());
    assert!(check(json!({"enum": [1, "two"]}), json!(1.0)).is_valid());
    assert!(!check(json!({"const": {"a": 1}}), json!({"a": 2})).is_valid());
    assert!(check(json!({"const": {"a": 1}}), json!({"a": 1.0})).is_valid());
}

#[test]
fn property_applicators_descend_into_members() {
    let schema = json!({
        "properties": {"a": {"type": "integer"}},
        "patternProperties": {"^p": {"type": "string"}},
        "additionalProperties": {"type": "boolean"}
    });
    assert!(check(schema.clone(), json!({"a": 1, "p1": "s", "extra": true})).is_valid());

    let results = check(schema, json!({"a": 1, "extra": 7}));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("additionalProperties"));

    let results = check(json!({"propertyNames": {"maxLength": 3}}), json!({"long-name": 1}));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("propertyNames"));
}

#[test]
fn array_applicators_follow_the_2020_12_split() {
    let schema = json!({
        "prefixItems": [{"type": "string"}],
        "items": {"type": "integer"}
    });
    assert!(check(schema.clone(), json!(["a", 1, 2])).is_valid());
    assert!(!check(schema.clone(), json!([1])).is_valid());
    let results = check(schema, json!(["a", 1, "b"]));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("items"));
}

#[test]
fn tuple_items_follow_the_2019_09_form() {
    let mut options = ValidationOptions::new();
    options.evaluate_as(Draft::Draft201909);
    let validator = Validator::new_with_options(options);
    let schema = validator
        .compile(&json!({
            "items": [{"type": "string"}, {"type": "integer"}],
            "additionalItems": {"type": "boolean"}
        }))
        .unwrap();

    assert!(validator.validate(&schema, &json!(["a", 1, true])).is_valid());
    let results = validator.validate(&schema, &json!(["a", "b"]));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("items"));
    let results = validator.validate(&schema, &json!(["a", 1, "x"]));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("additionalItems"));
}

#[test]
fn contains_honors_min_and_max() {
    let schema = json!({"contains": {"type": "integer"}});
    assert!(check(schema.clone(), json!([1, "a"])).is_valid());
    assert!(!check(schema, json!(["a", "b"])).is_valid());

    let schema = json!({"contains": {"type": "integer"}, "minContains": 2});
    assert!(check(schema.clone(), json!([1, "a", 2])).is_valid());
    let results = check(schema, json!([1, "a"]));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("minContains"));

    let schema = json!({"contains": {"type": "integer"}, "minContains": 0});
    assert!(check(schema, json!(["a"])).is_valid());

    let schema = json!({"contains": {"type": "integer"}, "maxContains": 1});
    let results = check(schema, json!([1, 2]));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("maxContains"));
}

#[test]
fn unevaluated_properties_see_through_in_place_applicators() {
    let schema = json!({
        "properties": {"a": true},
        "patternProperties": {"^p": true},
        "allOf": [{"properties": {"b": true}}],
        "unevaluatedProperties": false
    });
    assert!(check(schema.clone(), json!({"a": 1, "b": 2, "p9": 3})).is_valid());

    let results = check(schema, json!({"a": 1, "b": 2, "z": 3}));
    assert!(!results.is_valid());
    let message = results.errors().get("unevaluatedProperties").unwrap();
    assert!(message.as_str().unwrap().contains('z'));
}

#[test]
fn unevaluated_properties_reject_what_properties_missed() {
    let results = check(
        json!({"properties": {"a": {"type": "integer"}}, "unevaluatedProperties": false}),
        json!({"a": 1, "b": 2}),
    );
    assert!(!results.is_valid());
    let message = results.errors().get("unevaluatedProperties").unwrap();
    assert!(message.as_str().unwrap().contains('b'));
}

#[test]
fn unevaluated_items_consider_prefix_coverage() {
    let schema = json!({"prefixItems": [true], "unevaluatedItems": false});
    assert!(check(schema.clone(), json!(["a"])).is_valid());
    let results = check(schema, json!(["a", "b"]));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("unevaluatedItems"));
}

#[test]
fn recursive_reference_cycles_terminate_on_finite_instances() {
    let schema = json!({
        "$ref": "#/$defs/node",
        "$defs": {
            "node": {
                "type": "object",
                "properties": {"next": {"$ref": "#/$defs/node"}}
            }
        }
    });
    assert!(check(schema.clone(), json!({"next": {"next": {}}})).is_valid());
    assert!(!check(schema, json!({"next": {"next": 3}})).is_valid());
}

#[test]
fn format_is_an_annotation_unless_asked_to_assert() {
    let (validator, schema) = compiled(json!({"format": "date-time"}));
    let results = validator.validate(&schema, &json!("not a date"));
    assert!(results.is_valid());
    assert_eq!(results.annotations().get("format"), Some(&json!("date-time")));

    let mut options = ValidationOptions::new();
    options.validate_format(true);
    let validator = Validator::new_with_options(options);
    let schema = validator.compile(&json!({"format": "date-time"})).unwrap();
    assert!(!validator.validate(&schema, &json!("not a date")).is_valid());
    assert!(validator
        .validate(&schema, &json!("2026-08-02T10:30:00Z"))
        .is_valid());
    // Non-strings are out of scope for format.
    assert!(validator.validate(&schema, &json!(12)).is_valid());
}

#[test]
fn unregistered_formats_can_be_required() {
    let mut options = ValidationOptions::new();
    options.validate_format(true);
    let validator = Validator::new_with_options(options);
    let schema = validator.compile(&json!({"format": "made-up"})).unwrap();
    assert!(validator.validate(&schema, &json!("anything")).is_valid());

    let mut options = ValidationOptions::new();
    options.validate_format(true).require_format_validation(true);
    let validator = Validator::new_with_options(options);
    let schema = validator.compile(&json!({"format": "made-up"})).unwrap();
    let results = validator.validate(&schema, &json!("anything"));
    assert!(!results.is_valid());
    assert!(results.errors().contains_key("format"));
}

#[test]
fn unknown_keywords_become_annotations() {
    let results = check(json!({"x-vendor": {"a": 1}, "type": "object"}), json!({}));
    assert!(results.is_valid());
    assert_eq!(results.annotations().get("x-vendor"), Some(&json!({"a": 1})));
}

#[test]
fn annotation_only_keywords_never_change_the_verdict() {
    let plain = json!({"type": "integer"});
    let annotated = json!({
        "type": "integer",
        "title": "count",
        "description": "a count",
        "examples": [1, 2],
        "deprecated": true
    });
    for instance in [json!(3), json!(3.5), json!("x"), json!(null)] {
        assert_eq!(
            check(plain.clone(), instance.clone()).is_valid(),
            check(annotated.clone(), instance).is_valid()
        );
    }
}

#[test]
fn reference_is_transparent_for_validity() {
    let through_ref = json!({
        "$ref": "#/$defs/x",
        "$defs": {"x": {"type": "integer"}}
    });
    let direct = json!({"type": "integer"});
    for instance in [json!(3), json!(3.5), json!("a"), json!([1])] {
        assert_eq!(
            check(through_ref.clone(), instance.clone()).is_valid(),
            check(direct.clone(), instance).is_valid()
        );
    }
}

#[test]
fn validation_is_deterministic() {
    let (validator, schema) = compiled(json!({
        "properties": {"a": {"anyOf": [{"type": "string"}, {"minimum": 3}]}},
        "unevaluatedProperties": false
    }));
    let instance = json!({"a": 2, "b": 1});
    let first = validator.validate(&schema, &instance);
    let second = validator.validate(&schema, &instance);
    assert_eq!(first, second);
}

#[test]
fn transforms_preserve_the_verdict() {
    let (validator, schema) = compiled(json!({"allOf": [{"type": "string"}, {"minLength": 2}]}));
    for instance in [json!("ok"), json!("a"), json!(5)] {
        let results = validator.validate(&schema, &instance);
        let verdict = results.is_valid();

        let mut flagged = results.clone();
        flagged.to_flag();
        assert_eq!(flagged.is_valid(), verdict);

        let mut basic = results.clone();
        basic.to_basic();
        assert_eq!(basic.is_valid(), verdict);
    }
}

#[test]
fn flag_output_is_cheaper_but_agrees() {
    let schema = json!({"allOf": [{"type": "string"}, {"minLength": 2}]});
    let mut options = ValidationOptions::new();
    options.output_format(OutputFormat::Flag);
    let flag_validator = Validator::new_with_options(options);
    let flag_schema = flag_validator.compile(&schema).unwrap();

    for instance in [json!("ok"), json!("a"), json!(7)] {
        let hierarchical = check(schema.clone(), instance.clone());
        let flagged = flag_validator.validate(&flag_schema, &instance);
        assert_eq!(hierarchical.is_valid(), flagged.is_valid());
    }
}

#[test]
fn meta_validation_uses_the_registered_meta_schema() {
    let registry = std::sync::Arc::new(jsv::SchemaRegistry::new());
    registry
        .register(
            &"https://example.com/meta".parse().unwrap(),
            &json!({"type": ["object", "boolean"]}),
            None,
        )
        .unwrap();
    let mut options = ValidationOptions::new();
    options.schema_registry(registry);

    options
        .registry()
        .register(
            &"https://example.com/strict-meta".parse().unwrap(),
            &json!({"type": ["object", "boolean"], "required": ["title"]}),
            None,
        )
        .unwrap();

    let good = json!({"$schema": "https://example.com/meta", "type": "string"});
    assert!(jsv::meta_validate(&good, &options).unwrap().is_valid());

    let untitled = json!({"$schema": "https://example.com/strict-meta", "type": "string"});
    assert!(!jsv::meta_validate(&untitled, &options).unwrap().is_valid());

    let unresolvable = json!({"$schema": "https://example.com/absent"});
    assert!(jsv::meta_validate(&unresolvable, &options).is_err());
}
