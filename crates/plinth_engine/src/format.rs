//! Value formats: how a target's in-memory value maps to its file.
//!
//! A [`Format`] is the collaborator a target delegates `load`, `save` and
//! value validation to. Four formats ship with the engine and are selected
//! by [`FormatKind`]:
//!
//! | Kind     | File content          | In-memory value            |
//! |----------|-----------------------|----------------------------|
//! | `opaque` | anything              | none (never loaded)        |
//! | `text`   | UTF-8 text            | a JSON string              |
//! | `json`   | a JSON document       | the document               |
//! | `toml`   | a TOML document       | the document as a JSON map |
//!
//! A document that is empty (or JSON `null`) loads as *absent*, which makes
//! [`Session::get`](crate::Session::get) fail with `NotLoaded`.

use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use plinth_common::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised by a [`Format`] while loading or saving.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// Reading or writing the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file content could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The value could not be encoded.
    #[error("serialize error: {0}")]
    Serialize(String),

    /// The format does not support the operation.
    #[error("{kind} targets do not support {operation}")]
    Unsupported {
        /// The format kind.
        kind: &'static str,
        /// The refused operation.
        operation: &'static str,
    },
}

/// Maps a target value to and from its file.
pub trait Format {
    /// Short name of the format, used for `targets_by_kind` queries.
    fn kind(&self) -> &'static str;

    /// Reads the value stored at `location`.
    ///
    /// `Ok(None)` means the file holds no value.
    fn load(&self, location: &Path) -> Result<Option<Value>, FormatError>;

    /// Writes `value` to `location`.
    fn save(&self, location: &Path, value: &Value) -> Result<(), FormatError>;

    /// Validates a value before it is assigned; `Err` carries the reason.
    fn sanity_check(&self, _value: &Value) -> Result<(), String> {
        Ok(())
    }

    /// A longer human readable description of a target in this format.
    fn detailed_description(&self, location: &Path, value: Option<&Value>) -> String {
        let state = if value.is_some() { "loaded" } else { "not loaded" };
        format!("{} target at {} ({state})", self.kind(), location.display())
    }
}

/// The built-in formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    /// Externally produced file, never loaded or saved by the engine.
    #[default]
    Opaque,
    /// Plain UTF-8 text.
    Text,
    /// JSON document.
    Json,
    /// TOML document.
    Toml,
}

impl FormatKind {
    /// Returns a shared instance of the format.
    pub fn instantiate(self) -> Rc<dyn Format> {
        match self {
            FormatKind::Opaque => Rc::new(OpaqueFormat),
            FormatKind::Text => Rc::new(TextFormat),
            FormatKind::Json => Rc::new(JsonFormat),
            FormatKind::Toml => Rc::new(TomlFormat),
        }
    }

    /// The name reported by [`Format::kind`].
    pub fn as_str(self) -> &'static str {
        match self {
            FormatKind::Opaque => "opaque",
            FormatKind::Text => "text",
            FormatKind::Json => "json",
            FormatKind::Toml => "toml",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file the engine tracks by timestamp only.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueFormat;

impl Format for OpaqueFormat {
    fn kind(&self) -> &'static str {
        "opaque"
    }

    fn load(&self, _location: &Path) -> Result<Option<Value>, FormatError> {
        Err(FormatError::Unsupported {
            kind: "opaque",
            operation: "load",
        })
    }

    fn save(&self, _location: &Path, _value: &Value) -> Result<(), FormatError> {
        Err(FormatError::Unsupported {
            kind: "opaque",
            operation: "save",
        })
    }

    fn sanity_check(&self, _value: &Value) -> Result<(), String> {
        Err("opaque targets hold no in-memory value".to_string())
    }

    fn detailed_description(&self, location: &Path, _value: Option<&Value>) -> String {
        format!("externally produced file at {}", location.display())
    }
}

/// Plain text file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormat;

impl Format for TextFormat {
    fn kind(&self) -> &'static str {
        "text"
    }

    fn load(&self, location: &Path) -> Result<Option<Value>, FormatError> {
        Ok(Some(Value::String(fs::read_to_string(location)?)))
    }

    fn save(&self, location: &Path, value: &Value) -> Result<(), FormatError> {
        let text = value
            .as_str()
            .ok_or_else(|| FormatError::Serialize("text targets hold strings".to_string()))?;
        write_atomic(location, text.as_bytes())?;
        Ok(())
    }

    fn sanity_check(&self, value: &Value) -> Result<(), String> {
        if value.is_string() {
            Ok(())
        } else {
            Err(format!("expected a string, got {}", json_type(value)))
        }
    }

    fn detailed_description(&self, location: &Path, value: Option<&Value>) -> String {
        match value.and_then(Value::as_str) {
            Some(text) => format!(
                "text target at {} ({} lines)",
                location.display(),
                text.lines().count()
            ),
            None => format!("text target at {} (not loaded)", location.display()),
        }
    }
}

/// JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl Format for JsonFormat {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn load(&self, location: &Path) -> Result<Option<Value>, FormatError> {
        let content = fs::read_to_string(location)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let value: Value =
            serde_json::from_str(&content).map_err(|e| FormatError::Parse(e.to_string()))?;
        Ok((!value.is_null()).then_some(value))
    }

    fn save(&self, location: &Path, value: &Value) -> Result<(), FormatError> {
        let mut content =
            serde_json::to_string_pretty(value).map_err(|e| FormatError::Serialize(e.to_string()))?;
        content.push('\n');
        write_atomic(location, content.as_bytes())?;
        Ok(())
    }
}

/// TOML document; the value is always a map.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlFormat;

impl Format for TomlFormat {
    fn kind(&self) -> &'static str {
        "toml"
    }

    fn load(&self, location: &Path) -> Result<Option<Value>, FormatError> {
        let content = fs::read_to_string(location)?;
        let table: toml::Table =
            toml::from_str(&content).map_err(|e| FormatError::Parse(e.to_string()))?;
        if table.is_empty() {
            return Ok(None);
        }
        let value = serde_json::to_value(table).map_err(|e| FormatError::Parse(e.to_string()))?;
        Ok(Some(value))
    }

    fn save(&self, location: &Path, value: &Value) -> Result<(), FormatError> {
        let content =
            toml::to_string_pretty(value).map_err(|e| FormatError::Serialize(e.to_string()))?;
        write_atomic(location, content.as_bytes())?;
        Ok(())
    }

    fn sanity_check(&self, value: &Value) -> Result<(), String> {
        if !value.is_object() {
            return Err(format!("expected a table, got {}", json_type(value)));
        }
        if contains_null(value) {
            return Err("TOML cannot represent null".to_string());
        }
        Ok(())
    }
}

fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(map) => map.values().any(contains_null),
        _ => false,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_match_instances() {
        for kind in [
            FormatKind::Opaque,
            FormatKind::Text,
            FormatKind::Json,
            FormatKind::Toml,
        ] {
            assert_eq!(kind.instantiate().kind(), kind.as_str());
        }
    }

    #[test]
    fn kind_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Holder {
            format: FormatKind,
        }
        let h: Holder = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(h.format, FormatKind::Json);
    }

    #[test]
    fn opaque_refuses_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        assert!(matches!(
            OpaqueFormat.load(&path),
            Err(FormatError::Unsupported { operation: "load", .. })
        ));
        assert!(OpaqueFormat.sanity_check(&json!(1)).is_err());
    }

    #[test]
    fn text_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        TextFormat.save(&path, &json!("hello\nworld\n")).unwrap();
        let value = TextFormat.load(&path).unwrap().unwrap();
        assert_eq!(value, json!("hello\nworld\n"));
        assert!(TextFormat.sanity_check(&json!(3)).is_err());
    }

    #[test]
    fn json_empty_and_null_load_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.json");
        let null = dir.path().join("null.json");
        fs::write(&empty, "  \n").unwrap();
        fs::write(&null, "null").unwrap();
        assert!(JsonFormat.load(&empty).unwrap().is_none());
        assert!(JsonFormat.load(&null).unwrap().is_none());
    }

    #[test]
    fn json_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(JsonFormat.load(&path), Err(FormatError::Parse(_))));
    }

    #[test]
    fn json_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("data.json");
        JsonFormat.save(&path, &json!({"n": 3})).unwrap();
        assert_eq!(JsonFormat.load(&path).unwrap(), Some(json!({"n": 3})));
    }

    #[test]
    fn toml_load_converts_to_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "pattern = \"*.csv\"\n[opts]\ndepth = 2\n").unwrap();
        let value = TomlFormat.load(&path).unwrap().unwrap();
        assert_eq!(value["pattern"], json!("*.csv"));
        assert_eq!(value["opts"]["depth"], json!(2));
    }

    #[test]
    fn toml_empty_document_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "# nothing yet\n").unwrap();
        assert!(TomlFormat.load(&path).unwrap().is_none());
    }

    #[test]
    fn toml_sanity_check_rejects_non_tables_and_nulls() {
        assert!(TomlFormat.sanity_check(&json!([1, 2])).is_err());
        assert!(TomlFormat.sanity_check(&json!({"a": null})).is_err());
        assert!(TomlFormat.sanity_check(&json!({"a": [1, 2]})).is_ok());
    }

    #[test]
    fn toml_save_round_trips_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.toml");
        TomlFormat
            .save(&path, &json!({"name": "x", "count": 4}))
            .unwrap();
        let value = TomlFormat.load(&path).unwrap().unwrap();
        assert_eq!(value, json!({"name": "x", "count": 4}));
    }

    #[test]
    fn default_description_mentions_state() {
        let text = JsonFormat.detailed_description(Path::new("/p/a.json"), None);
        assert_eq!(text, "json target at /p/a.json (not loaded)");
    }
}
