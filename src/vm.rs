use crate::json;
use crate::keywords::{CompiledKeyword, Keyword};
use crate::options::{OutputFormat, ValidationOptions};
use crate::pointer::JsonPointer;
use crate::registry::SchemaRegistry;
use crate::results::ValidationResults;
use crate::schema::{Draft, ObjectSchema, Schema};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::trace;
use url::Url;

/// The stack of schema frames active during evaluation, used to resolve
/// `$recursiveRef` and `$dynamicRef`.
#[derive(Default)]
pub(crate) struct DynamicScope {
    frames: Vec<(Url, Schema)>,
}

impl DynamicScope {
    fn push(&mut self, base_uri: Url, schema: Schema) {
        self.frames.push((base_uri, schema));
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Frame base URIs, outermost first.
    pub(crate) fn bases(&self) -> impl Iterator<Item = &Url> {
        self.frames.iter().map(|(base_uri, _)| base_uri)
    }
}

/// Why evaluation unwound early. Everything else is recorded in the
/// result tree and never propagates as an error.
enum Unwind {
    Cancelled,
    DepthExceeded,
}

/// Walk `schema` against `instance` and return the result tree.
///
/// Cancellation and the depth guard fail the node they interrupt and
/// unwind; the returned tree is then partial with an invalid root.
pub(crate) fn validate(
    schema: &Schema,
    instance: &Value,
    options: &ValidationOptions,
) -> ValidationResults {
    let mut root = ValidationResults::new(
        JsonPointer::root(),
        JsonPointer::root(),
        OutputFormat::Hierarchical,
    );
    let mut vm = Vm {
        options,
        registry: options.registry().as_ref(),
        scope: DynamicScope::default(),
        ref_stack: Vec::new(),
    };
    let _ = vm.eval(schema, instance, &mut root);
    match options.get_output_format() {
        OutputFormat::Flag => root.to_flag(),
        OutputFormat::Basic => root.to_basic(),
        OutputFormat::Hierarchical => {}
    }
    root
}

struct Vm<'a> {
    options: &'a ValidationOptions,
    registry: &'a SchemaRegistry,
    scope: DynamicScope,
    /// (schema identity, instance location) per active reference
    /// delegation; a repeat means the schema recurses without consuming
    /// the instance.
    ref_stack: Vec<(Url, String)>,
}

impl<'a> Vm<'a> {
    fn eval(
        &mut self,
        schema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        match schema {
            Schema::Bool(true) => Ok(()),
            Schema::Bool(false) => {
                results.fail("", "All values fail against the false schema", &[]);
                Ok(())
            }
            Schema::Object(node) => {
                results.set_schema_location(node.schema_uri());
                self.scope.push(node.base_uri().clone(), schema.clone());
                let outcome = self.eval_object(node, instance, results);
                self.scope.pop();
                outcome
            }
        }
    }

    fn eval_object(
        &mut self,
        node: &ObjectSchema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let flag_mode = self.options.get_output_format() == OutputFormat::Flag;
        for keyword in node.keywords() {
            if self.options.is_cancelled() {
                results.fail("", "validation was cancelled", &[]);
                return Err(Unwind::Cancelled);
            }
            if self.options.get_log() {
                trace!(
                    keyword = keyword.name.as_str(),
                    kind = ?keyword.handler.kind(),
                    evaluation_path = %results.evaluation_path(),
                    "evaluating keyword"
                );
            }
            self.eval_keyword(node, keyword, instance, results)?;
            // Assertions short-circuit only when nobody reads the rest
            // of the tree.
            if flag_mode && !results.is_valid() {
                break;
            }
        }
        Ok(())
    }

    fn eval_keyword(
        &mut self,
        node: &ObjectSchema,
        keyword: &CompiledKeyword,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        match &keyword.handler {
            Keyword::Identifier
            | Keyword::Defs(_)
            | Keyword::MinContains(_)
            | Keyword::MaxContains(_)
            | Keyword::Then(_)
            | Keyword::Else(_) => Ok(()),

            Keyword::Annotation | Keyword::Unknown | Keyword::ContentSchema(_) => {
                results.annotate(&keyword.name, keyword.value.clone());
                Ok(())
            }

            Keyword::Ref(target) => {
                self.eval_reference("$ref", target.clone(), instance, results)
            }
            Keyword::RecursiveRef => self.eval_recursive_ref(node, instance, results),
            Keyword::DynamicRef(target) => {
                self.eval_dynamic_ref(target.clone(), instance, results)
            }

            Keyword::Type(expected) => {
                if !expected.matches(instance) {
                    results.fail(
                        "type",
                        "Value is \"{received}\" but should be \"{expected}\"",
                        &[
                            ("received", json::type_of(instance).to_owned()),
                            ("expected", expected.describe()),
                        ],
                    );
                }
                Ok(())
            }
            Keyword::Enum(values) => {
                if !values.iter().any(|value| json::deep_eq(value, instance)) {
                    results.fail("enum", "Value does not match any of the enumerated values", &[]);
                }
                Ok(())
            }
            Keyword::Const(value) => {
                if !json::deep_eq(value, instance) {
                    results.fail("const", "Value does not match the constant value", &[]);
                }
                Ok(())
            }

            Keyword::MinLength(limit) => {
                if let Value::String(s) = instance {
                    let length = s.chars().count() as u64;
                    if length < *limit {
                        results.fail(
                            "minLength",
                            "Value is shorter than {limit} characters",
                            &[("limit", limit.to_string())],
                        );
                    }
                }
                Ok(())
            }
            Keyword::MaxLength(limit) => {
                if let Value::String(s) = instance {
                    let length = s.chars().count() as u64;
                    if length > *limit {
                        results.fail(
                            "maxLength",
                            "Value is longer than {limit} characters",
                            &[("limit", limit.to_string())],
                        );
                    }
                }
                Ok(())
            }
            Keyword::Pattern(pattern) => {
                if let Value::String(s) = instance {
                    if !pattern.is_match(s) {
                        results.fail(
                            "pattern",
                            "Value does not match the pattern {pattern}",
                            &[("pattern", pattern.as_str().to_owned())],
                        );
                    }
                }
                Ok(())
            }

            Keyword::Minimum(limit) => self.check_bound(
                instance,
                results,
                "minimum",
                *limit,
                |v, l| v >= l,
                "Value is less than {limit}",
            ),
            Keyword::ExclusiveMinimum(limit) => self.check_bound(
                instance,
                results,
                "exclusiveMinimum",
                *limit,
                |v, l| v > l,
                "Value is not greater than {limit}",
            ),
            Keyword::Maximum(limit) => self.check_bound(
                instance,
                results,
                "maximum",
                *limit,
                |v, l| v <= l,
                "Value is greater than {limit}",
            ),
            Keyword::ExclusiveMaximum(limit) => self.check_bound(
                instance,
                results,
                "exclusiveMaximum",
                *limit,
                |v, l| v < l,
                "Value is not less than {limit}",
            ),
            Keyword::MultipleOf(factor) => {
                if let Some(value) = instance.as_f64() {
                    if (value / factor).fract() != 0.0 {
                        results.fail(
                            "multipleOf",
                            "Value is not a multiple of {factor}",
                            &[("factor", factor.to_string())],
                        );
                    }
                }
                Ok(())
            }

            Keyword::MinItems(limit) => {
                if let Value::Array(items) = instance {
                    if (items.len() as u64) < *limit {
                        results.fail(
                            "minItems",
                            "Array has fewer than {limit} items",
                            &[("limit", limit.to_string())],
                        );
                    }
                }
                Ok(())
            }
            Keyword::MaxItems(limit) => {
                if let Value::Array(items) = instance {
                    if (items.len() as u64) > *limit {
                        results.fail(
                            "maxItems",
                            "Array has more than {limit} items",
                            &[("limit", limit.to_string())],
                        );
                    }
                }
                Ok(())
            }
            Keyword::UniqueItems(unique) => {
                if let (Value::Array(items), true) = (instance, *unique) {
                    'outer: for i in 0..items.len() {
                        for j in (i + 1)..items.len() {
                            if json::deep_eq(&items[i], &items[j]) {
                                results.fail(
                                    "uniqueItems",
                                    "Array items at indices {first} and {second} are equal",
                                    &[("first", i.to_string()), ("second", j.to_string())],
                                );
                                break 'outer;
                            }
                        }
                    }
                }
                Ok(())
            }

            Keyword::MinProperties(limit) => {
                if let Value::Object(map) = instance {
                    if (map.len() as u64) < *limit {
                        results.fail(
                            "minProperties",
                            "Object has fewer than {limit} properties",
                            &[("limit", limit.to_string())],
                        );
                    }
                }
                Ok(())
            }
            Keyword::MaxProperties(limit) => {
                if let Value::Object(map) = instance {
                    if (map.len() as u64) > *limit {
                        results.fail(
                            "maxProperties",
                            "Object has more than {limit} properties",
                            &[("limit", limit.to_string())],
                        );
                    }
                }
                Ok(())
            }
            Keyword::Required(names) => {
                if let Value::Object(map) = instance {
                    let missing: Vec<&str> = names
                        .iter()
                        .filter(|name| !map.contains_key(*name))
                        .map(String::as_str)
                        .collect();
                    if !missing.is_empty() {
                        results.fail(
                            "required",
                            "Required properties [{missing}] are absent",
                            &[("missing", missing.join(", "))],
                        );
                    }
                }
                Ok(())
            }
            Keyword::DependentRequired(dependencies) => {
                if let Value::Object(map) = instance {
                    let mut missing = Vec::new();
                    for (trigger, needed) in dependencies {
                        if map.contains_key(trigger) {
                            for name in needed {
                                if !map.contains_key(name) {
                                    missing.push(name.as_str());
                                }
                            }
                        }
                    }
                    if !missing.is_empty() {
                        results.fail(
                            "dependentRequired",
                            "Required properties [{missing}] are absent",
                            &[("missing", missing.join(", "))],
                        );
                    }
                }
                Ok(())
            }

            Keyword::AllOf(subschemas) => self.eval_all_of(node, subschemas, instance, results),
            Keyword::AnyOf(subschemas) => self.eval_any_of(node, subschemas, instance, results),
            Keyword::OneOf(subschemas) => self.eval_one_of(node, subschemas, instance, results),
            Keyword::Not(subschema) => {
                let suffix = JsonPointer::root().child("not");
                let location = results.instance_location().clone();
                let valid =
                    self.apply_subschema(node, suffix, subschema, instance, location, results)?;
                if valid {
                    results.fail("not", "The value matched the negated schema", &[]);
                }
                Ok(())
            }
            Keyword::If(condition) => self.eval_conditional(node, condition, instance, results),
            Keyword::DependentSchemas(dependencies) => {
                self.eval_dependent_schemas(node, dependencies, instance, results)
            }

            Keyword::Properties(properties) => {
                self.eval_properties(node, properties, instance, results)
            }
            Keyword::PatternProperties(patterns) => {
                self.eval_pattern_properties(node, patterns, instance, results)
            }
            Keyword::AdditionalProperties(subschema) => {
                self.eval_additional_properties(node, subschema, instance, results)
            }
            Keyword::PropertyNames(subschema) => {
                self.eval_property_names(node, subschema, instance, results)
            }
            Keyword::PrefixItems(subschemas) => {
                self.eval_prefix_items(node, subschemas, instance, results)
            }
            Keyword::Items(subschema) => self.eval_items(node, subschema, instance, results),
            Keyword::TupleItems(subschemas) => {
                self.eval_tuple_items(node, subschemas, instance, results)
            }
            Keyword::AdditionalItems(subschema) => {
                self.eval_additional_items(node, subschema, instance, results)
            }
            Keyword::Contains(subschema) => self.eval_contains(node, subschema, instance, results),

            Keyword::UnevaluatedProperties(subschema) => {
                self.eval_unevaluated_properties(node, subschema, instance, results)
            }
            Keyword::UnevaluatedItems(subschema) => {
                self.eval_unevaluated_items(node, subschema, instance, results)
            }

            Keyword::Format(format) => self.eval_format(format, &keyword.value, instance, results),
        }
    }

    fn check_bound(
        &self,
        instance: &Value,
        results: &mut ValidationResults,
        keyword: &str,
        limit: f64,
        satisfied: fn(f64, f64) -> bool,
        template: &str,
    ) -> Result<(), Unwind> {
        if let Some(value) = instance.as_f64() {
            if !satisfied(value, limit) {
                results.fail(keyword, template, &[("limit", limit.to_string())]);
            }
        }
        Ok(())
    }

    /// Evaluate `schema` as a child result of `results`, attaching the
    /// child node and reporting its validity. An unwinding error still
    /// attaches the partial child and marks the parent invalid.
    fn eval_child(
        &mut self,
        schema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
        evaluation_path: JsonPointer,
        instance_location: JsonPointer,
        fallback_location: Option<Url>,
    ) -> Result<bool, Unwind> {
        let mut child = ValidationResults::new(
            evaluation_path,
            instance_location,
            OutputFormat::Hierarchical,
        );
        if let Some(uri) = fallback_location {
            child.set_schema_location(uri);
        }
        let outcome = self.eval(schema, instance, &mut child);
        let valid = child.is_valid();
        results.push_nested(child);
        match outcome {
            Ok(()) => Ok(valid),
            Err(unwind) => {
                results.mark_invalid();
                Err(unwind)
            }
        }
    }

    /// Evaluate a subschema reached through `suffix` from `node`, e.g.
    /// `/allOf/0` or `/properties/a`.
    fn apply_subschema(
        &mut self,
        node: &ObjectSchema,
        suffix: JsonPointer,
        schema: &Schema,
        instance: &Value,
        instance_location: JsonPointer,
        results: &mut ValidationResults,
    ) -> Result<bool, Unwind> {
        let evaluation_path = results.evaluation_path().combine(&suffix);
        let mut fallback = node.base_uri().clone();
        fallback.set_fragment(Some(&node.location().combine(&suffix).to_string()));
        self.eval_child(
            schema,
            instance,
            results,
            evaluation_path,
            instance_location,
            Some(fallback),
        )
    }

    fn eval_reference(
        &mut self,
        name: &str,
        target: Url,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        match self.registry.resolve(&target) {
            Ok(schema) => self.delegate(name, &schema, target, instance, results),
            Err(_) => {
                results.fail(
                    name,
                    "Cannot resolve reference {uri}",
                    &[("uri", target.to_string())],
                );
                Ok(())
            }
        }
    }

    fn eval_recursive_ref(
        &mut self,
        node: &ObjectSchema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let mut target = match self.registry.resource_root(node.base_uri()) {
            Some(schema) => schema,
            None => {
                results.fail(
                    "$recursiveRef",
                    "Cannot resolve reference {uri}",
                    &[("uri", format!("{}#", node.base_uri()))],
                );
                return Ok(());
            }
        };
        // `$recursiveAnchor: true` at the target re-routes to the
        // outermost dynamic-scope resource that also sets it.
        if recursive_anchor(&target) {
            let mut outermost = None;
            for base in self.scope.bases() {
                if let Some(candidate) = self.registry.resource_root(base) {
                    if recursive_anchor(&candidate) {
                        outermost = Some(candidate);
                        break;
                    }
                }
            }
            if let Some(candidate) = outermost {
                target = candidate;
            }
        }
        let target_uri = match target.as_object() {
            Some(object) => object.schema_uri(),
            None => node.base_uri().clone(),
        };
        self.delegate("$recursiveRef", &target, target_uri, instance, results)
    }

    fn eval_dynamic_ref(
        &mut self,
        target: Url,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let fragment = target.fragment().unwrap_or("").to_owned();
        if fragment.is_empty() || fragment.starts_with('/') || fragment.starts_with("%2F") {
            // Not an anchor: behaves exactly like `$ref`.
            return self.eval_reference("$dynamicRef", target, instance, results);
        }
        let mut base = target.clone();
        base.set_fragment(None);
        let resolved = match self.registry.resolve_anchor(&base, &fragment, false, &self.scope) {
            Some(schema) => schema,
            None => {
                results.fail(
                    "$dynamicRef",
                    "Cannot resolve reference {uri}",
                    &[("uri", target.to_string())],
                );
                return Ok(());
            }
        };
        // Bookending: the dynamic scan only applies when the statically
        // resolved target is itself a dynamic anchor.
        let resolved = if self.registry.has_dynamic_anchor(&base, &fragment) {
            self.registry
                .resolve_anchor(&base, &fragment, true, &self.scope)
                .unwrap_or(resolved)
        } else {
            resolved
        };
        self.delegate("$dynamicRef", &resolved, target, instance, results)
    }

    /// Delegate evaluation to a referenced schema, guarding against
    /// non-productive loops and runaway depth.
    fn delegate(
        &mut self,
        name: &str,
        schema: &Schema,
        target: Url,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let identity = match schema.as_object() {
            Some(object) => object.schema_uri(),
            None => target.clone(),
        };
        let frame = (identity, results.instance_location().to_string());
        if self.ref_stack.contains(&frame) {
            results.fail(
                name,
                "Reference loop detected at {uri}",
                &[("uri", frame.0.to_string())],
            );
            return Ok(());
        }
        let limit = self.options.get_max_depth();
        if self.ref_stack.len() >= limit {
            results.fail(
                name,
                "Maximum reference depth of {limit} exceeded",
                &[("limit", limit.to_string())],
            );
            return Err(Unwind::DepthExceeded);
        }

        let evaluation_path = results.evaluation_path().child(name);
        let instance_location = results.instance_location().clone();
        self.ref_stack.push(frame);
        let outcome = self.eval_child(
            schema,
            instance,
            results,
            evaluation_path,
            instance_location,
            Some(target),
        );
        self.ref_stack.pop();
        if !outcome? {
            results.fail(name, "The referenced schema failed to validate", &[]);
        }
        Ok(())
    }

    fn eval_all_of(
        &mut self,
        node: &ObjectSchema,
        subschemas: &[Schema],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let flag_mode = self.options.get_output_format() == OutputFormat::Flag;
        let mut failed = 0usize;
        for (index, subschema) in subschemas.iter().enumerate() {
            let suffix = JsonPointer::root().child("allOf").child(index);
            let location = results.instance_location().clone();
            if !self.apply_subschema(node, suffix, subschema, instance, location, results)? {
                failed += 1;
                if flag_mode {
                    break;
                }
            }
        }
        if failed > 0 {
            results.fail(
                "allOf",
                "{failed} of {total} subschemas failed to validate",
                &[("failed", failed.to_string()), ("total", subschemas.len().to_string())],
            );
        }
        Ok(())
    }

    fn eval_any_of(
        &mut self,
        node: &ObjectSchema,
        subschemas: &[Schema],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let flag_mode = self.options.get_output_format() == OutputFormat::Flag;
        let mut matched = false;
        for (index, subschema) in subschemas.iter().enumerate() {
            let suffix = JsonPointer::root().child("anyOf").child(index);
            let location = results.instance_location().clone();
            if self.apply_subschema(node, suffix, subschema, instance, location, results)? {
                matched = true;
                if flag_mode {
                    break;
                }
            }
        }
        if !matched {
            results.fail("anyOf", "No subschema matched the value", &[]);
        }
        Ok(())
    }

    fn eval_one_of(
        &mut self,
        node: &ObjectSchema,
        subschemas: &[Schema],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let mut matched = 0usize;
        for (index, subschema) in subschemas.iter().enumerate() {
            let suffix = JsonPointer::root().child("oneOf").child(index);
            let location = results.instance_location().clone();
            if self.apply_subschema(node, suffix, subschema, instance, location, results)? {
                matched += 1;
            }
        }
        if matched != 1 {
            results.fail(
                "oneOf",
                "Expected exactly 1 matching subschema but found {found}",
                &[("found", matched.to_string())],
            );
        }
        Ok(())
    }

    fn eval_conditional(
        &mut self,
        node: &ObjectSchema,
        condition: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let suffix = JsonPointer::root().child("if");
        let location = results.instance_location().clone();
        // The condition selects a branch; its own validity does not count.
        let selected =
            self.apply_subschema(node, suffix, condition, instance, location, results)?;
        let branch = if selected {
            node.keyword("then")
        } else {
            node.keyword("else")
        };
        let (branch_name, subschema) = match branch.map(|kw| &kw.handler) {
            Some(Keyword::Then(subschema)) => ("then", subschema),
            Some(Keyword::Else(subschema)) => ("else", subschema),
            _ => return Ok(()),
        };
        let suffix = JsonPointer::root().child(branch_name);
        let location = results.instance_location().clone();
        if !self.apply_subschema(node, suffix, subschema, instance, location, results)? {
            results.fail(
                branch_name,
                "The {branch} subschema failed to validate",
                &[("branch", branch_name.to_owned())],
            );
        }
        Ok(())
    }

    fn eval_dependent_schemas(
        &mut self,
        node: &ObjectSchema,
        dependencies: &[(String, Schema)],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let map = match instance {
            Value::Object(map) => map,
            _ => return Ok(()),
        };
        let mut failed = Vec::new();
        for (trigger, subschema) in dependencies {
            if !map.contains_key(trigger) {
                continue;
            }
            let suffix = JsonPointer::root()
                .child("dependentSchemas")
                .child(trigger.as_str());
            let location = results.instance_location().clone();
            if !self.apply_subschema(node, suffix, subschema, instance, location, results)? {
                failed.push(trigger.as_str());
            }
        }
        if !failed.is_empty() {
            results.fail(
                "dependentSchemas",
                "Dependent schemas for properties [{properties}] failed to validate",
                &[("properties", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_properties(
        &mut self,
        node: &ObjectSchema,
        properties: &[(String, Schema)],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let map = match instance {
            Value::Object(map) => map,
            _ => return Ok(()),
        };
        let mut matched = Vec::new();
        let mut failed = Vec::new();
        for (name, subschema) in properties {
            let value = match map.get(name) {
                Some(value) => value,
                None => continue,
            };
            let suffix = JsonPointer::root().child("properties").child(name.as_str());
            let location = results.instance_location().child(name.as_str());
            matched.push(name.as_str());
            if !self.apply_subschema(node, suffix, subschema, value, location, results)? {
                failed.push(name.as_str());
            }
        }
        if failed.is_empty() {
            results.annotate("properties", json!(matched));
        } else {
            results.fail(
                "properties",
                "Properties [{properties}] failed to validate",
                &[("properties", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_pattern_properties(
        &mut self,
        node: &ObjectSchema,
        patterns: &[(String, Regex, Schema)],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let map = match instance {
            Value::Object(map) => map,
            _ => return Ok(()),
        };
        let mut matched: Vec<&str> = Vec::new();
        let mut failed = Vec::new();
        for (source, pattern, subschema) in patterns {
            for (key, value) in map {
                if !pattern.is_match(key) {
                    continue;
                }
                let suffix = JsonPointer::root()
                    .child("patternProperties")
                    .child(source.as_str());
                let location = results.instance_location().child(key.as_str());
                if !matched.contains(&key.as_str()) {
                    matched.push(key.as_str());
                }
                if !self.apply_subschema(node, suffix, subschema, value, location, results)? {
                    failed.push(key.as_str());
                }
            }
        }
        if failed.is_empty() {
            results.annotate("patternProperties", json!(matched));
        } else {
            results.fail(
                "patternProperties",
                "Properties [{properties}] failed to validate",
                &[("properties", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_additional_properties(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let map = match instance {
            Value::Object(map) => map,
            _ => return Ok(()),
        };
        let mut covered: HashSet<&str> = HashSet::new();
        if let Some(Keyword::Properties(properties)) =
            node.keyword("properties").map(|kw| &kw.handler)
        {
            for (name, _) in properties {
                if map.contains_key(name) {
                    covered.insert(name.as_str());
                }
            }
        }
        if let Some(Keyword::PatternProperties(patterns)) =
            node.keyword("patternProperties").map(|kw| &kw.handler)
        {
            for key in map.keys() {
                if patterns.iter().any(|(_, pattern, _)| pattern.is_match(key)) {
                    covered.insert(key.as_str());
                }
            }
        }

        let mut evaluated = Vec::new();
        let mut failed = Vec::new();
        for (key, value) in map {
            if covered.contains(key.as_str()) {
                continue;
            }
            let suffix = JsonPointer::root().child("additionalProperties");
            let location = results.instance_location().child(key.as_str());
            evaluated.push(key.as_str());
            if !self.apply_subschema(node, suffix, subschema, value, location, results)? {
                failed.push(key.as_str());
            }
        }
        if failed.is_empty() {
            results.annotate("additionalProperties", json!(evaluated));
        } else {
            results.fail(
                "additionalProperties",
                "Properties [{properties}] failed to validate",
                &[("properties", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_property_names(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let map = match instance {
            Value::Object(map) => map,
            _ => return Ok(()),
        };
        let mut failed = Vec::new();
        for key in map.keys() {
            let name = Value::String(key.clone());
            let suffix = JsonPointer::root().child("propertyNames");
            let location = results.instance_location().child(key.as_str());
            if !self.apply_subschema(node, suffix, subschema, &name, location, results)? {
                failed.push(key.as_str());
            }
        }
        if !failed.is_empty() {
            results.fail(
                "propertyNames",
                "Property names [{properties}] failed to validate",
                &[("properties", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_prefix_items(
        &mut self,
        node: &ObjectSchema,
        subschemas: &[Schema],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let items = match instance {
            Value::Array(items) => items,
            _ => return Ok(()),
        };
        let count = items.len().min(subschemas.len());
        let mut failed = Vec::new();
        for index in 0..count {
            let suffix = JsonPointer::root().child("prefixItems").child(index);
            let location = results.instance_location().child(index);
            if !self.apply_subschema(
                node,
                suffix,
                &subschemas[index],
                &items[index],
                location,
                results,
            )? {
                failed.push(index.to_string());
            }
        }
        if !failed.is_empty() {
            results.fail(
                "prefixItems",
                "Items at indices [{indices}] failed to validate",
                &[("indices", failed.join(", "))],
            );
        } else if count > 0 {
            let annotation = if count == items.len() {
                json!(true)
            } else {
                json!(count - 1)
            };
            results.annotate("prefixItems", annotation);
        }
        Ok(())
    }

    fn eval_items(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let items = match instance {
            Value::Array(items) => items,
            _ => return Ok(()),
        };
        let start = match node.keyword("prefixItems").map(|kw| &kw.handler) {
            Some(Keyword::PrefixItems(prefix)) if node.draft() == Draft::Draft202012 => {
                prefix.len().min(items.len())
            }
            _ => 0,
        };
        if start >= items.len() {
            return Ok(());
        }
        let mut failed = Vec::new();
        for (index, item) in items.iter().enumerate().skip(start) {
            let suffix = JsonPointer::root().child("items");
            let location = results.instance_location().child(index);
            if !self.apply_subschema(node, suffix, subschema, item, location, results)? {
                failed.push(index.to_string());
            }
        }
        if failed.is_empty() {
            results.annotate("items", json!(true));
        } else {
            results.fail(
                "items",
                "Items at indices [{indices}] failed to validate",
                &[("indices", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_tuple_items(
        &mut self,
        node: &ObjectSchema,
        subschemas: &[Schema],
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let items = match instance {
            Value::Array(items) => items,
            _ => return Ok(()),
        };
        let count = items.len().min(subschemas.len());
        let mut failed = Vec::new();
        for index in 0..count {
            let suffix = JsonPointer::root().child("items").child(index);
            let location = results.instance_location().child(index);
            if !self.apply_subschema(
                node,
                suffix,
                &subschemas[index],
                &items[index],
                location,
                results,
            )? {
                failed.push(index.to_string());
            }
        }
        if !failed.is_empty() {
            results.fail(
                "items",
                "Items at indices [{indices}] failed to validate",
                &[("indices", failed.join(", "))],
            );
        } else if count > 0 {
            let annotation = if count == items.len() {
                json!(true)
            } else {
                json!(count - 1)
            };
            results.annotate("items", annotation);
        }
        Ok(())
    }

    fn eval_additional_items(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let items = match instance {
            Value::Array(items) => items,
            _ => return Ok(()),
        };
        // Only meaningful when the sibling `items` is a tuple.
        let start = match node.keyword("items").map(|kw| &kw.handler) {
            Some(Keyword::TupleItems(tuple)) => tuple.len(),
            _ => return Ok(()),
        };
        if start >= items.len() {
            return Ok(());
        }
        let mut failed = Vec::new();
        for (index, item) in items.iter().enumerate().skip(start) {
            let suffix = JsonPointer::root().child("additionalItems");
            let location = results.instance_location().child(index);
            if !self.apply_subschema(node, suffix, subschema, item, location, results)? {
                failed.push(index.to_string());
            }
        }
        if failed.is_empty() {
            results.annotate("additionalItems", json!(true));
        } else {
            results.fail(
                "additionalItems",
                "Items at indices [{indices}] failed to validate",
                &[("indices", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_contains(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let items = match instance {
            Value::Array(items) => items,
            _ => return Ok(()),
        };
        let mut matched = Vec::new();
        for (index, item) in items.iter().enumerate() {
            let suffix = JsonPointer::root().child("contains");
            let location = results.instance_location().child(index);
            if self.apply_subschema(node, suffix, subschema, item, location, results)? {
                matched.push(index);
            }
        }
        let minimum = match node.keyword("minContains").map(|kw| &kw.handler) {
            Some(Keyword::MinContains(minimum)) => Some(*minimum),
            _ => None,
        };
        let maximum = match node.keyword("maxContains").map(|kw| &kw.handler) {
            Some(Keyword::MaxContains(maximum)) => Some(*maximum),
            _ => None,
        };
        let count = matched.len() as u64;
        let required = minimum.unwrap_or(1);
        let satisfied = count >= required && maximum.map(|limit| count <= limit).unwrap_or(true);
        if count < required {
            if minimum.is_some() {
                results.fail(
                    "minContains",
                    "The array contains {found} matching items; at least {limit} required",
                    &[("found", count.to_string()), ("limit", required.to_string())],
                );
            } else {
                results.fail("contains", "The array does not contain any matching items", &[]);
            }
        }
        if let Some(limit) = maximum {
            if count > limit {
                results.fail(
                    "maxContains",
                    "The array contains {found} matching items; at most {limit} allowed",
                    &[("found", count.to_string()), ("limit", limit.to_string())],
                );
            }
        }
        if satisfied {
            if count == items.len() as u64 && !items.is_empty() {
                results.annotate("contains", json!(true));
            } else {
                results.annotate("contains", json!(matched));
            }
        }
        Ok(())
    }

    fn eval_unevaluated_properties(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let map = match instance {
            Value::Object(map) => map,
            _ => return Ok(()),
        };
        let mut evaluated: HashSet<String> = HashSet::new();
        let mut all_evaluated = false;
        for annotation in results.gathered_annotations(&[
            "properties",
            "patternProperties",
            "additionalProperties",
            "unevaluatedProperties",
        ]) {
            match annotation {
                Value::Array(names) => {
                    for name in names {
                        if let Some(name) = name.as_str() {
                            evaluated.insert(name.to_owned());
                        }
                    }
                }
                Value::Bool(true) => all_evaluated = true,
                _ => {}
            }
        }
        if all_evaluated {
            results.annotate("unevaluatedProperties", json!([]));
            return Ok(());
        }

        let mut seen = Vec::new();
        let mut failed = Vec::new();
        for (key, value) in map {
            if evaluated.contains(key.as_str()) {
                continue;
            }
            let suffix = JsonPointer::root().child("unevaluatedProperties");
            let location = results.instance_location().child(key.as_str());
            seen.push(key.clone());
            if !self.apply_subschema(node, suffix, subschema, value, location, results)? {
                failed.push(key.as_str());
            }
        }
        if failed.is_empty() {
            results.annotate("unevaluatedProperties", json!(seen));
        } else {
            results.fail(
                "unevaluatedProperties",
                "Unevaluated properties [{properties}] are not allowed",
                &[("properties", failed.join(", "))],
            );
        }
        Ok(())
    }

    fn eval_unevaluated_items(
        &mut self,
        node: &ObjectSchema,
        subschema: &Schema,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        let items = match instance {
            Value::Array(items) => items,
            _ => return Ok(()),
        };
        let mut keys = vec![
            "prefixItems",
            "items",
            "additionalItems",
            "unevaluatedItems",
        ];
        if node.draft() == Draft::Draft202012 {
            keys.push("contains");
        }
        let mut all_evaluated = false;
        let mut covered_prefix: Option<usize> = None;
        let mut covered_indices: HashSet<usize> = HashSet::new();
        for annotation in results.gathered_annotations(&keys) {
            match annotation {
                Value::Bool(true) => all_evaluated = true,
                Value::Number(n) => {
                    if let Some(index) = n.as_u64() {
                        let end = index as usize;
                        covered_prefix =
                            Some(covered_prefix.map(|prior| prior.max(end)).unwrap_or(end));
                    }
                }
                Value::Array(indices) => {
                    for index in indices {
                        if let Some(index) = index.as_u64() {
                            covered_indices.insert(index as usize);
                        }
                    }
                }
                _ => {}
            }
        }
        if all_evaluated {
            results.annotate("unevaluatedItems", json!(true));
            return Ok(());
        }

        let mut failed = Vec::new();
        let mut any = false;
        for (index, item) in items.iter().enumerate() {
            let in_prefix = covered_prefix.map(|end| index <= end).unwrap_or(false);
            if in_prefix || covered_indices.contains(&index) {
                continue;
            }
            let suffix = JsonPointer::root().child("unevaluatedItems");
            let location = results.instance_location().child(index);
            any = true;
            if !self.apply_subschema(node, suffix, subschema, item, location, results)? {
                failed.push(index.to_string());
            }
        }
        if !failed.is_empty() {
            results.fail(
                "unevaluatedItems",
                "Unevaluated items at indices [{indices}] are not allowed",
                &[("indices", failed.join(", "))],
            );
        } else if any {
            results.annotate("unevaluatedItems", json!(true));
        }
        Ok(())
    }

    fn eval_format(
        &mut self,
        format: &str,
        raw: &Value,
        instance: &Value,
        results: &mut ValidationResults,
    ) -> Result<(), Unwind> {
        results.annotate("format", raw.clone());
        if !self.options.get_validate_format() {
            return Ok(());
        }
        match format_validator(format) {
            Some(check) => {
                if let Value::String(s) = instance {
                    if !check(s) {
                        results.fail(
                            "format",
                            "Value does not match the {format} format",
                            &[("format", format.to_owned())],
                        );
                    }
                }
            }
            None => {
                if self.options.get_require_format_validation() {
                    results.fail(
                        "format",
                        "No validator registered for format {format}",
                        &[("format", format.to_owned())],
                    );
                }
            }
        }
        Ok(())
    }
}

fn recursive_anchor(schema: &Schema) -> bool {
    schema
        .as_object()
        .map(|object| object.recursive_anchor())
        .unwrap_or(false)
}

/// Built-in `format` validators.
fn format_validator(name: &str) -> Option<fn(&str) -> bool> {
    match name {
        "date-time" => Some(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        "date" => Some(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        "time" => Some(|s| {
            DateTime::parse_from_rfc3339(&format!("1970-01-01T{}", s)).is_ok()
        }),
        "duration" => Some(is_duration),
        "email" => Some(|s| {
            static EMAIL: Lazy<Regex> =
                Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("email pattern compiles"));
            EMAIL.is_match(s)
        }),
        "hostname" => Some(|s| {
            static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
                Regex::new(
                    r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
                )
                .expect("hostname pattern compiles")
            });
            HOSTNAME.is_match(s)
        }),
        "ipv4" => Some(|s| s.parse::<std::net::Ipv4Addr>().is_ok()),
        "ipv6" => Some(|s| s.parse::<std::net::Ipv6Addr>().is_ok()),
        "uri" => Some(|s| Url::parse(s).is_ok()),
        "uri-reference" => Some(|s| {
            Url::parse("https://example.com/")
                .expect("reference base parses")
                .join(s)
                .is_ok()
        }),
        "uuid" => Some(|s| {
            static UUID: Lazy<Regex> = Lazy::new(|| {
                Regex::new(
                    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
                )
                .expect("uuid pattern compiles")
            });
            UUID.is_match(s)
        }),
        "regex" => Some(|s| Regex::new(s).is_ok()),
        "json-pointer" => Some(|s| s.parse::<JsonPointer>().is_ok() && !s.starts_with('#')),
        "relative-json-pointer" => Some(|s| {
            static RELATIVE: Lazy<Regex> = Lazy::new(|| {
                Regex::new(r"^(0|[1-9][0-9]*)(#|(/.*)?)$")
                    .expect("relative pointer pattern compiles")
            });
            RELATIVE.is_match(s)
        }),
        _ => None,
    }
}

/// ISO 8601 duration, e.g. `P1DT12H`. The pattern admits an empty body,
/// so reject strings ending in a designator-less `P` or `T`.
fn is_duration(s: &str) -> bool {
    static DURATION: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^P(\d+W|(\d+Y)?(\d+M)?(\d+D)?(T(\d+H)?(\d+M)?(\d+(\.\d+)?S)?)?)$")
            .expect("duration pattern compiles")
    });
    DURATION.is_match(s) && !s.ends_with('P') && !s.ends_with('T')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_validators_accept_and_reject() {
        let date_time = format_validator("date-time").unwrap();
        assert!(date_time("2026-08-02T10:30:00Z"));
        assert!(!date_time("2026-08-02"));

        let duration = format_validator("duration").unwrap();
        assert!(duration("P1DT12H"));
        assert!(duration("P3W"));
        assert!(!duration("P"));
        assert!(!duration("P1DT"));

        let ipv4 = format_validator("ipv4").unwrap();
        assert!(ipv4("127.0.0.1"));
        assert!(!ipv4("127.0.0.256"));

        let uuid = format_validator("uuid").unwrap();
        assert!(uuid("123e4567-e89b-12d3-a456-426614174000"));
        assert!(!uuid("123e4567"));

        assert!(format_validator("unheard-of").is_none());
    }
}
