//! Firestore REST document encoding.
//!
//! Firestore wraps every field in a typed value object
//! (`{"stringValue": "..."}`, `{"integerValue": "123"}`, ...). Decoding is
//! lenient: unknown fields are ignored and wrongly-typed fields read as
//! missing, so one bad record never fails a whole snapshot.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::models::{NewTodo, TodoPatch, TodoRecord};

pub const FIELD_TEXT: &str = "text";
pub const FIELD_COMPLETED: &str = "completed";
pub const FIELD_CREATED_AT: &str = "createdAt";

/// A document as returned by get/list/create.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    /// Full resource name, ending in `/{document_id}`.
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl Document {
    /// Last path segment of the resource name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    pub fn to_record(&self) -> TodoRecord {
        TodoRecord {
            id: self.id().to_string(),
            text: string_field(&self.fields, FIELD_TEXT),
            completed: bool_field(&self.fields, FIELD_COMPLETED),
            created_at: integer_field(&self.fields, FIELD_CREATED_AT),
        }
    }
}

/// One page of `documents.list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    pub next_page_token: Option<String>,
}

/// Error envelope returned with non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

pub fn encode_new_todo(todo: &NewTodo) -> Value {
    json!({
        "fields": {
            FIELD_TEXT: { "stringValue": todo.text },
            FIELD_COMPLETED: { "booleanValue": todo.completed },
            FIELD_CREATED_AT: { "integerValue": todo.created_at.to_string() },
        }
    })
}

pub fn encode_patch(patch: &TodoPatch) -> Value {
    let mut fields = Map::new();
    if let Some(completed) = patch.completed {
        fields.insert(
            FIELD_COMPLETED.to_string(),
            json!({ "booleanValue": completed }),
        );
    }
    json!({ "fields": fields })
}

fn string_field(fields: &HashMap<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)?
        .get("stringValue")?
        .as_str()
        .map(str::to_string)
}

fn bool_field(fields: &HashMap<String, Value>, name: &str) -> Option<bool> {
    fields.get(name)?.get("booleanValue")?.as_bool()
}

// integerValue is a decimal string on the wire; JavaScript clients often
// write timestamps as doubleValue instead.
fn integer_field(fields: &HashMap<String, Value>, name: &str) -> Option<i64> {
    let value = fields.get(name)?;
    if let Some(int) = value.get("integerValue") {
        return match int {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
    }
    value
        .get("doubleValue")?
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f as i64)
}
