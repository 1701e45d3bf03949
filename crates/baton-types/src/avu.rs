use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// An attribute-value-unit metadata triple.
///
/// An empty `unit` means "no unit". Equality is structural over all three
/// fields, so `("a", "1", "")` and `("a", "1", "kb")` are different AVUs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Avu {
    pub attribute: String,
    pub value: String,
    #[serde(default, alias = "units", skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

impl Avu {
    /// An AVU without a unit.
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            unit: String::new(),
        }
    }

    pub fn with_unit(
        attribute: impl Into<String>,
        value: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            unit: unit.into(),
        }
    }

    pub fn has_unit(&self) -> bool {
        !self.unit.is_empty()
    }

    /// Extract an AVU from a JSON object.
    ///
    /// `attribute` and `value` must be present and be strings; `unit` (or
    /// `units`) is optional.
    pub fn from_json(json: &Value) -> Result<Self, TypeError> {
        let obj = json
            .as_object()
            .ok_or_else(|| TypeError::InvalidAvu(format!("not a JSON object: {json}")))?;

        let attribute = required_str(obj, "attribute")?;
        let value = required_str(obj, "value")?;
        let unit = match obj.get("unit").or_else(|| obj.get("units")) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(TypeError::InvalidAvu(format!("unit is not a string: {other}")))
            }
        };

        Ok(Self {
            attribute,
            value,
            unit,
        })
    }

    /// Parse a JSON array of AVU objects.
    pub fn list_from_json(json: &Value) -> Result<Vec<Self>, TypeError> {
        json.as_array()
            .ok_or_else(|| TypeError::InvalidAvu(format!("AVUs are not a JSON array: {json}")))?
            .iter()
            .map(Self::from_json)
            .collect()
    }

    pub fn to_json(&self) -> Value {
        // Serializing a struct of strings cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Avu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_unit() {
            write!(f, "{{{}: {} [{}]}}", self.attribute, self.value, self.unit)
        } else {
            write!(f, "{{{}: {}}}", self.attribute, self.value)
        }
    }
}

fn required_str(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String, TypeError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(TypeError::InvalidAvu(format!("{key} is not a string: {other}"))),
        None => Err(TypeError::InvalidAvu(format!("missing {key}"))),
    }
}

/// A metadata mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataOp {
    #[serde(rename = "add")]
    Add,
    #[serde(rename = "rm")]
    Remove,
}

impl MetadataOp {
    /// The server's operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "rm",
        }
    }
}

impl fmt::Display for MetadataOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataOp {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "rm" | "remove" => Ok(Self::Remove),
            other => Err(TypeError::InvalidOperation(other.to_string())),
        }
    }
}

/// One AVU with the operation to apply to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOperation {
    pub operation: MetadataOp,
    #[serde(flatten)]
    pub avu: Avu,
}

impl MetadataOperation {
    pub fn new(operation: MetadataOp, avu: Avu) -> Self {
        Self { operation, avu }
    }

    /// Parse `{operation, attribute, value, unit?}`.
    pub fn from_json(json: &Value) -> Result<Self, TypeError> {
        let op = json
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| TypeError::InvalidOperation(format!("missing operation in {json}")))?
            .parse()?;
        Ok(Self::new(op, Avu::from_json(json)?))
    }

    pub fn list_from_json(json: &Value) -> Result<Vec<Self>, TypeError> {
        json.as_array()
            .ok_or_else(|| {
                TypeError::InvalidOperation(format!("operations are not a JSON array: {json}"))
            })?
            .iter()
            .map(Self::from_json)
            .collect()
    }
}
