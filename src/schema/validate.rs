/*
 * Copyright 2024 Clinical Store Contributors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use serde_json::Value;

use crate::error::{Error, Result};
use crate::time::parse_timestamp;

/// The structural type of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Bool,
    Number,
    /// A string-typed field whose value is parsed as an ISO-8601 timestamp.
    Timestamp,
    Object(Vec<FieldSpec>),
    Array(Box<FieldType>),
    /// Accepts any JSON value; used for fields this model intentionally
    /// leaves unconstrained (e.g. a free-form `plan` document).
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub optional: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldSpec {
            name: name.into(),
            field_type,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldSpec {
            name: name.into(),
            field_type,
            optional: true,
        }
    }
}

/// A structural schema: a flat or nested set of declared fields. Unknown
/// fields are rejected; optional fields must be explicitly marked as such.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Schema { fields }
    }

    /// Return a copy of this schema with the standard metadata fields and
    /// one `<ancestorName>Id` field per ancestor model name appended.
    pub fn augmented(&self, ancestor_names: &[String]) -> Schema {
        let mut fields = self.fields.clone();
        fields.extend(super::base_metadata_fields());
        for ancestor in ancestor_names {
            fields.push(FieldSpec::required(
                format!("{}Id", singular(ancestor)),
                FieldType::String,
            ));
        }
        Schema { fields }
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        validate_object(&self.fields, value, "$")
    }
}

/// A minimal singularization: model definitions name their ancestor-id
/// fields after the ancestor's model name, e.g. `clientFileId` for the
/// `clientFile` model. Collection names in this crate are already singular
/// model names, so this is the identity function; kept as a named seam in
/// case a future model names its collection in the plural.
fn singular(collection_name: &str) -> &str {
    collection_name
}

fn validate_object(fields: &[FieldSpec], value: &Value, path: &str) -> Result<()> {
    let Value::Object(map) = value else {
        return Err(Error::Validation {
            collection: path.to_string(),
            message: format!("expected an object at {path}"),
        });
    };

    for spec in fields {
        match map.get(&spec.name) {
            Some(field_value) => {
                validate_field(spec, field_value, &format!("{path}.{}", spec.name))?;
            }
            None if spec.optional => {}
            None => {
                return Err(Error::Validation {
                    collection: path.to_string(),
                    message: format!("missing required field {path}.{}", spec.name),
                });
            }
        }
    }

    let known: std::collections::HashSet<&str> =
        fields.iter().map(|f| f.name.as_str()).collect();
    for key in map.keys() {
        if !known.contains(key.as_str()) {
            return Err(Error::Validation {
                collection: path.to_string(),
                message: format!("unknown field {path}.{key}"),
            });
        }
    }

    Ok(())
}

fn validate_field(spec: &FieldSpec, value: &Value, path: &str) -> Result<()> {
    match &spec.field_type {
        FieldType::String => {
            if !value.is_string() {
                return Err(type_error(path, "string"));
            }
        }
        FieldType::Bool => {
            if !value.is_boolean() {
                return Err(type_error(path, "bool"));
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                return Err(type_error(path, "number"));
            }
        }
        FieldType::Timestamp => {
            let s = value.as_str().ok_or_else(|| type_error(path, "timestamp string"))?;
            parse_timestamp(s).map_err(|_| type_error(path, "ISO-8601 timestamp"))?;
        }
        FieldType::Object(nested) => {
            validate_object(nested, value, path)?;
        }
        FieldType::Array(item_type) => {
            let Value::Array(items) = value else {
                return Err(type_error(path, "array"));
            };
            let item_spec = FieldSpec {
                name: String::new(),
                field_type: (**item_type).clone(),
                optional: false,
            };
            for (i, item) in items.iter().enumerate() {
                validate_field(&item_spec, item, &format!("{path}[{i}]"))?;
            }
        }
        FieldType::Any => {}
    }
    Ok(())
}

fn type_error(path: &str, expected: &str) -> Error {
    Error::Validation {
        collection: path.to_string(),
        message: format!("expected {expected} at {path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_name_schema() -> Schema {
        Schema::new(vec![FieldSpec::required(
            "clientName",
            FieldType::Object(vec![
                FieldSpec::required("first", FieldType::String),
                FieldSpec::optional("middle", FieldType::String),
                FieldSpec::required("last", FieldType::String),
            ]),
        )])
    }

    #[test]
    fn accepts_valid_object() {
        let schema = client_name_schema();
        let value = json!({"clientName": {"first": "Ada", "middle": "", "last": "Lovelace"}});
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let schema = Schema::new(vec![FieldSpec::required(
            "status",
            FieldType::String,
        )]);
        assert!(schema.validate(&json!({})).is_err());
    }

    #[test]
    fn rejects_unknown_field() {
        let schema = Schema::new(vec![FieldSpec::required("notes", FieldType::String)]);
        let value = json!({"notes": "hi", "extra": "nope"});
        assert!(schema.validate(&value).is_err());
    }

    #[test]
    fn augmented_schema_requires_ancestor_id() {
        let schema = Schema::new(vec![FieldSpec::required("notes", FieldType::String)])
            .augmented(&["clientFile".to_string()]);
        assert!(schema.fields.iter().any(|f| f.name == "clientFileId"));
        assert!(schema.fields.iter().any(|f| f.name == "id"));
    }
}
