use crate::CompileError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// A single resource definition: a kind plus an opaque property bag that may
/// contain reference markers pointing at other resources in the same graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub properties: Value,
}

/// An exported output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Export {
    pub name: String,
}

/// The compiled resource graph: resources and outputs keyed by identifier.
///
/// BTreeMap keys give a stable ordering, so serializing the same graph twice
/// is byte-identical.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, Resource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource; a key that already exists is a defect, never a
    /// silent overwrite.
    pub fn insert_resource(
        &mut self,
        logical_id: impl Into<String>,
        resource: Resource,
    ) -> Result<(), CompileError> {
        match self.resources.entry(logical_id.into()) {
            Entry::Occupied(occupied) => {
                Err(CompileError::ResourceCollision(occupied.key().clone()))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(resource);
                Ok(())
            }
        }
    }

    /// Insert an output; same collision rule as [`insert_resource`].
    pub fn insert_output(
        &mut self,
        name: impl Into<String>,
        output: Output,
    ) -> Result<(), CompileError> {
        match self.outputs.entry(name.into()) {
            Entry::Occupied(occupied) => Err(CompileError::OutputCollision(occupied.key().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(output);
                Ok(())
            }
        }
    }

    /// Left-to-right union with another graph, asserting key-disjointness
    /// before every insert.
    pub fn merge(&mut self, other: Template) -> Result<(), CompileError> {
        for (logical_id, resource) in other.resources {
            self.insert_resource(logical_id, resource)?;
        }
        for (name, output) in other.outputs {
            self.insert_output(name, output)?;
        }
        Ok(())
    }

    /// Check that every `Ref`/`Fn::GetAtt` target and every `DependsOn`
    /// entry names a resource present in this graph. `AWS::` pseudo
    /// parameters are always in scope.
    pub fn validate_references(&self) -> Result<(), CompileError> {
        for (logical_id, resource) in &self.resources {
            let mut targets = Vec::new();
            collect_references(&resource.properties, &mut targets);
            targets.extend(resource.depends_on.iter().cloned());
            self.check_targets(logical_id, &targets)?;
        }
        for (name, output) in &self.outputs {
            let mut targets = Vec::new();
            collect_references(&output.value, &mut targets);
            self.check_targets(name, &targets)?;
        }
        Ok(())
    }

    fn check_targets(&self, from: &str, targets: &[String]) -> Result<(), CompileError> {
        for target in targets {
            if target.starts_with("AWS::") {
                continue;
            }
            if !self.resources.contains_key(target) {
                return Err(CompileError::DanglingReference {
                    from: from.to_owned(),
                    to: target.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reference marker for another resource's attribute: `Fn::GetAtt`.
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Reference marker for another resource: `Ref`.
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// Render a tag map as the `[{Key, Value}]` list the backend expects.
pub fn tag_list(tags: &BTreeMap<String, String>) -> Value {
    Value::Array(
        tags.iter()
            .map(|(key, value)| json!({ "Key": key, "Value": value }))
            .collect(),
    )
}

/// Shallow-merge an overlay bag over compiled properties; overlay keys win.
pub(crate) fn apply_overlay(properties: &mut Value, overlay: &Map<String, Value>) {
    if overlay.is_empty() {
        return;
    }
    if let Value::Object(bag) = properties {
        for (key, value) in overlay {
            bag.insert(key.clone(), value.clone());
        }
    }
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(target) = map.get("Ref").and_then(Value::as_str) {
                    out.push(target.to_owned());
                    return;
                }
                if let Some(args) = map.get("Fn::GetAtt").and_then(Value::as_array) {
                    if let Some(target) = args.first().and_then(Value::as_str) {
                        out.push(target.to_owned());
                    }
                    return;
                }
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(kind: &str, properties: Value) -> Resource {
        Resource {
            kind: kind.to_owned(),
            depends_on: Vec::new(),
            properties,
        }
    }

    #[test]
    fn merge_unions_disjoint_graphs() {
        let mut left = Template::new();
        left.insert_resource("A", resource("Kind/A", json!({})))
            .unwrap();
        let mut right = Template::new();
        right
            .insert_resource("B", resource("Kind/B", json!({})))
            .unwrap();
        right
            .insert_output(
                "BOut",
                Output {
                    value: json!("b"),
                    export: None,
                },
            )
            .unwrap();

        left.merge(right).unwrap();
        assert_eq!(left.resources.len(), 2);
        assert_eq!(left.outputs.len(), 1);
    }

    #[test]
    fn merge_rejects_resource_collision() {
        let mut left = Template::new();
        left.insert_resource("A", resource("Kind/A", json!({})))
            .unwrap();
        let mut right = Template::new();
        right
            .insert_resource("A", resource("Kind/Other", json!({})))
            .unwrap();

        let err = left.merge(right).unwrap_err();
        assert!(matches!(err, CompileError::ResourceCollision(id) if id == "A"));
        // the original definition survives
        assert_eq!(left.resources["A"].kind, "Kind/A");
    }

    #[test]
    fn merge_rejects_output_collision() {
        let output = Output {
            value: json!("x"),
            export: None,
        };
        let mut left = Template::new();
        left.insert_output("Url", output.clone()).unwrap();
        let mut right = Template::new();
        right.insert_output("Url", output).unwrap();

        assert!(matches!(
            left.merge(right),
            Err(CompileError::OutputCollision(name)) if name == "Url"
        ));
    }

    #[test]
    fn validates_get_att_and_ref_targets() {
        let mut template = Template::new();
        template
            .insert_resource(
                "A",
                resource("Kind/A", json!({ "Peer": get_att("B", "Arn") })),
            )
            .unwrap();
        template
            .insert_resource("B", resource("Kind/B", json!({ "Back": reference("A") })))
            .unwrap();
        template.validate_references().unwrap();
    }

    #[test]
    fn dangling_reference_is_detected() {
        let mut template = Template::new();
        template
            .insert_resource(
                "A",
                resource("Kind/A", json!({ "Peer": get_att("Missing", "Arn") })),
            )
            .unwrap();
        let err = template.validate_references().unwrap_err();
        assert!(
            matches!(err, CompileError::DanglingReference { from, to } if from == "A" && to == "Missing")
        );
    }

    #[test]
    fn dangling_depends_on_is_detected() {
        let mut template = Template::new();
        template
            .insert_resource(
                "A",
                Resource {
                    kind: "Kind/A".to_owned(),
                    depends_on: vec!["Missing".to_owned()],
                    properties: json!({}),
                },
            )
            .unwrap();
        assert!(template.validate_references().is_err());
    }

    #[test]
    fn pseudo_parameters_are_always_in_scope() {
        let mut template = Template::new();
        template
            .insert_resource(
                "A",
                resource("Kind/A", json!({ "Region": reference("AWS::Region") })),
            )
            .unwrap();
        template.validate_references().unwrap();
    }

    #[test]
    fn output_references_are_validated() {
        let mut template = Template::new();
        template
            .insert_output(
                "Url",
                Output {
                    value: get_att("Missing", "ServiceUrl"),
                    export: None,
                },
            )
            .unwrap();
        assert!(template.validate_references().is_err());
    }

    #[test]
    fn tag_list_is_sorted_key_value_pairs() {
        let tags = BTreeMap::from([
            ("b".to_owned(), "2".to_owned()),
            ("a".to_owned(), "1".to_owned()),
        ]);
        assert_eq!(
            tag_list(&tags),
            json!([
                { "Key": "a", "Value": "1" },
                { "Key": "b", "Value": "2" },
            ])
        );
    }

    #[test]
    fn overlay_keys_win_over_compiled_properties() {
        let mut properties = json!({ "Kept": 1, "Replaced": 1 });
        let overlay = json!({ "Replaced": 2, "Added": 3 });
        let Value::Object(overlay) = overlay else {
            unreachable!()
        };
        apply_overlay(&mut properties, &overlay);
        assert_eq!(properties, json!({ "Kept": 1, "Replaced": 2, "Added": 3 }));
    }

    #[test]
    fn serialization_is_stable() {
        let mut template = Template::new();
        template
            .insert_resource("B", resource("Kind/B", json!({})))
            .unwrap();
        template
            .insert_resource("A", resource("Kind/A", json!({})))
            .unwrap();
        let first = template.to_canonical_json().unwrap();
        let second = template.clone().to_canonical_json().unwrap();
        assert_eq!(first, second);
        // BTreeMap ordering: A serializes before B regardless of insert order
        assert!(first.find("\"A\"").unwrap() < first.find("\"B\"").unwrap());
    }
}
