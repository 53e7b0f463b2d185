//! Content and part types exchanged with the model.

use serde::{Deserialize, Serialize};

/// Conversation role as seen by the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A model function call embedded in a part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// The result of a function call, sent back to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub response: serde_json::Value,
}

/// Inline binary payload (images, audio).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// A single part of message content.
///
/// Mirrors the provider wire shape: exactly one field is normally set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_response(
        call_id: impl Into<String>,
        name: impl Into<String>,
        response: serde_json::Value,
    ) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                id: Some(call_id.into()),
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

/// A part as produced by tools: either a bare string or a structured part.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PartUnion {
    Text(String),
    Part(Part),
}

impl PartUnion {
    /// Normalize into a structured part, wrapping bare strings as `{text}`.
    pub fn into_part(self) -> Part {
        match self {
            Self::Text(text) => Part::text(text),
            Self::Part(part) => part,
        }
    }
}

impl From<Part> for PartUnion {
    fn from(part: Part) -> Self {
        Self::Part(part)
    }
}

impl From<&str> for PartUnion {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// One part or a list of parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PartListUnion {
    Many(Vec<PartUnion>),
    One(PartUnion),
}

impl PartListUnion {
    /// Flatten one level into an ordered list of parts.
    pub fn into_vec(self) -> Vec<PartUnion> {
        match self {
            Self::Many(parts) => parts,
            Self::One(part) => vec![part],
        }
    }
}

impl From<Vec<Part>> for PartListUnion {
    fn from(parts: Vec<Part>) -> Self {
        Self::Many(parts.into_iter().map(PartUnion::Part).collect())
    }
}

/// A conversation turn as stored in model history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    /// Concatenate the text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| part.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn part_serializes_in_camel_case_wire_shape() {
        let part = Part::function_response("call-1", "read_file", serde_json::json!({"output": "ok"}));
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "functionResponse": {
                    "id": "call-1",
                    "name": "read_file",
                    "response": {"output": "ok"}
                }
            })
        );
    }

    #[test]
    fn part_list_accepts_string_object_and_array() {
        let one: PartListUnion = serde_json::from_value(serde_json::json!("b")).unwrap();
        assert_eq!(one.into_vec(), vec![PartUnion::Text("b".into())]);

        let obj: PartListUnion = serde_json::from_value(serde_json::json!({"text": "a"})).unwrap();
        assert_eq!(obj.into_vec(), vec![PartUnion::Part(Part::text("a"))]);

        let many: PartListUnion =
            serde_json::from_value(serde_json::json!([{"text": "c"}, "d"])).unwrap();
        assert_eq!(
            many.into_vec(),
            vec![PartUnion::Part(Part::text("c")), PartUnion::Text("d".into())]
        );
    }

    #[test]
    fn into_part_wraps_bare_strings() {
        assert_eq!(PartUnion::Text("x".into()).into_part(), Part::text("x"));
    }
}
