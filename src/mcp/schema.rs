//! Declarative tool argument schemas.
//!
//! A [`PropertyList`] declares the named, typed arguments a tool accepts.
//! It is used twice: to validate and default-fill the raw `arguments` object
//! of a `tools/call`, and to render the `inputSchema` advertised by
//! `tools/list`.
//!
//! Only three argument kinds exist: boolean, integer and string. Integer
//! properties may carry an inclusive `[min, max]` range; on other kinds a
//! range is ignored.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::mcp::error::{ArgumentError, SchemaError};

/// The kind of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// `true` / `false`.
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// UTF-8 string.
    String,
}

impl PropertyKind {
    /// Returns the JSON Schema type name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::String => "string",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed argument value, also the return type of tool callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Boolean value.
    Boolean(bool),
    /// Integer value.
    Integer(i64),
    /// String value.
    String(String),
}

impl PropertyValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> PropertyKind {
        match self {
            Self::Boolean(_) => PropertyKind::Boolean,
            Self::Integer(_) => PropertyKind::Integer,
            Self::String(_) => PropertyKind::String,
        }
    }

    /// Converts the value to JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

/// Booleans render as `true`/`false`; strings render unquoted.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// A single declared argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    kind: PropertyKind,
    default: Option<PropertyValue>,
    range: Option<(i64, i64)>,
}

impl Property {
    /// Declares a required argument of the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            range: None,
        }
    }

    /// Declares a required boolean argument.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Boolean)
    }

    /// Declares a required integer argument.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Integer)
    }

    /// Declares a required string argument.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::String)
    }

    /// Gives the argument a default, making it optional.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Restricts an integer argument to `min..=max`.
    #[must_use]
    pub const fn with_range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Returns the argument name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the argument kind.
    #[must_use]
    pub const fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Returns the default value, if any.
    #[must_use]
    pub const fn default_value(&self) -> Option<&PropertyValue> {
        self.default.as_ref()
    }

    /// Returns the enforced range. Always `None` for non-integer kinds.
    #[must_use]
    pub const fn range(&self) -> Option<(i64, i64)> {
        match self.kind {
            PropertyKind::Integer => self.range,
            PropertyKind::Boolean | PropertyKind::String => None,
        }
    }

    /// Whether the caller must supply this argument.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }

    fn check_declaration(&self) -> Result<(), SchemaError> {
        if let Some(default) = &self.default {
            if default.kind() != self.kind {
                return Err(SchemaError::DefaultKindMismatch {
                    name: self.name.clone(),
                    expected: self.kind,
                });
            }
        }
        if let Some((min, max)) = self.range() {
            if min > max {
                return Err(SchemaError::InvalidRange {
                    name: self.name.clone(),
                    min,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Type-checks a supplied raw value.
    #[allow(clippy::cast_possible_truncation)] // floats truncate toward zero by contract
    fn check_value(&self, raw: &Value) -> Result<PropertyValue, ArgumentError> {
        let mismatch = || ArgumentError::TypeMismatch {
            name: self.name.clone(),
            expected: self.kind,
        };

        match self.kind {
            PropertyKind::Boolean => raw.as_bool().map(PropertyValue::Boolean).ok_or_else(mismatch),
            PropertyKind::String => raw
                .as_str()
                .map(|s| PropertyValue::String(s.to_string()))
                .ok_or_else(mismatch),
            PropertyKind::Integer => {
                let value = raw
                    .as_i64()
                    .or_else(|| raw.as_f64().map(|f| f.trunc() as i64))
                    .ok_or_else(mismatch)?;

                if let Some((min, max)) = self.range() {
                    if value < min || value > max {
                        return Err(ArgumentError::RangeViolation {
                            name: self.name.clone(),
                            value,
                            min,
                            max,
                        });
                    }
                }
                Ok(PropertyValue::Integer(value))
            }
        }
    }

    fn to_schema_json(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!(self.kind.as_str()));
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.to_json());
        }
        if let Some((min, max)) = self.range() {
            schema.insert("minimum".to_string(), json!(min));
            schema.insert("maximum".to_string(), json!(max));
        }
        Value::Object(schema)
    }
}

/// An ordered set of uniquely named properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyList {
    properties: Vec<Property>,
}

impl PropertyList {
    /// Creates an empty list (a tool with no arguments).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            properties: Vec::new(),
        }
    }

    /// Builds a list from properties, in order.
    ///
    /// # Errors
    ///
    /// Returns an error on duplicate names, a default of the wrong kind, or
    /// an inverted integer range.
    pub fn from_properties(
        properties: impl IntoIterator<Item = Property>,
    ) -> Result<Self, SchemaError> {
        let mut list = Self::new();
        for property in properties {
            list.add(property)?;
        }
        Ok(list)
    }

    /// Appends a property.
    ///
    /// # Errors
    ///
    /// See [`PropertyList::from_properties`].
    pub fn add(&mut self, property: Property) -> Result<(), SchemaError> {
        if self.get(property.name()).is_some() {
            return Err(SchemaError::DuplicateProperty {
                name: property.name,
            });
        }
        property.check_declaration()?;
        self.properties.push(property);
        Ok(())
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Iterates properties in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    /// Number of declared properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether no properties are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Names of the properties without a default.
    #[must_use]
    pub fn required(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.is_required())
            .map(Property::name)
            .collect()
    }

    /// Validates raw call arguments and fills in defaults.
    ///
    /// `null` means "no arguments". Keys not declared in the schema are
    /// ignored, and a `null` value counts as absent.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure in declaration order.
    pub fn validate_and_fill(&self, raw: &Value) -> Result<Arguments, ArgumentError> {
        let empty = Map::new();
        let raw = match raw {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => return Err(ArgumentError::NotAnObject),
        };

        let mut values = IndexMap::with_capacity(self.properties.len());
        for property in &self.properties {
            let value = match raw.get(property.name()).filter(|v| !v.is_null()) {
                Some(supplied) => property.check_value(supplied)?,
                None => property
                    .default
                    .clone()
                    .ok_or_else(|| ArgumentError::MissingArgument {
                        name: property.name.clone(),
                    })?,
            };
            values.insert(property.name.clone(), value);
        }

        Ok(Arguments { values })
    }

    /// Renders the JSON Schema object used as a tool's `inputSchema`.
    #[must_use]
    pub fn to_schema_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.to_schema_json()))
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": self.required(),
        })
    }
}

/// Validated, fully populated arguments handed to a tool callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    values: IndexMap<String, PropertyValue>,
}

impl Arguments {
    /// Returns a value by property name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Returns a boolean argument.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(PropertyValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns an integer argument.
    #[must_use]
    pub fn get_integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(PropertyValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Returns a string argument.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Iterates `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of populated arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Converts back to a JSON object.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}
