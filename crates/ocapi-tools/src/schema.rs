use crate::catalog::{ParamKind, ParamSpec};
use rmcp::model::JsonObject;
use serde_json::{Value, json};

/// Build the MCP input schema for an endpoint's declared parameters.
#[must_use]
pub fn build_input_schema(params: &[ParamSpec]) -> JsonObject {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in params {
        properties.insert(param.name.clone(), property_schema(param));
        if param.required {
            required.push(param.name.clone());
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }
    schema
}

fn property_schema(param: &ParamSpec) -> Value {
    let mut prop = match param.kind {
        ParamKind::String => json!({ "type": "string" }),
        ParamKind::Number => json!({ "type": "number" }),
        ParamKind::Object => json!({ "type": "object", "additionalProperties": true }),
    };
    if !param.description.is_empty() {
        prop["description"] = json!(param.description);
    }
    prop
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, kind: ParamKind, required: bool) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            description: format!("{name} description"),
            kind,
            required,
        }
    }

    #[test]
    fn empty_params_yield_empty_object_schema() {
        let schema = build_input_schema(&[]);
        assert_eq!(
            Value::Object(schema),
            json!({ "type": "object", "properties": {} })
        );
    }

    #[test]
    fn maps_kinds_and_required() {
        let schema = build_input_schema(&[
            param("site_id", ParamKind::String, true),
            param("count", ParamKind::Number, false),
            param("requestBody", ParamKind::Object, false),
        ]);
        let schema = Value::Object(schema);

        assert_eq!(schema["properties"]["site_id"]["type"], "string");
        assert_eq!(
            schema["properties"]["site_id"]["description"],
            "site_id description"
        );
        assert_eq!(schema["properties"]["count"]["type"], "number");
        assert_eq!(schema["properties"]["requestBody"]["type"], "object");
        assert_eq!(
            schema["properties"]["requestBody"]["additionalProperties"],
            true
        );
        assert_eq!(schema["required"], json!(["site_id"]));
    }
}
