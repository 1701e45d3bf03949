use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Access level granted to a user or group.
///
/// `Null` removes any existing grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Null,
    Read,
    Write,
    Own,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Read => "read",
            Self::Write => "write",
            Self::Own => "own",
        }
    }

    /// Whether this level includes everything `other` grants.
    pub fn permits(&self, other: AccessLevel) -> bool {
        *self >= other
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = TypeError;

    /// Accepts the short names and the server's long forms
    /// (`read object`, `modify object`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', " ").as_str() {
            "null" | "none" => Ok(Self::Null),
            "read" | "read object" => Ok(Self::Read),
            "write" | "modify object" => Ok(Self::Write),
            "own" => Ok(Self::Own),
            _ => Err(TypeError::InvalidAccessLevel(s.to_string())),
        }
    }
}

/// Split `user#zone` into its parts.
pub fn parse_owner_specifier(spec: &str) -> Result<(String, Option<String>), TypeError> {
    let (owner, zone) = match spec.split_once('#') {
        Some((owner, zone)) => (owner, Some(zone)),
        None => (spec, None),
    };
    if owner.is_empty() {
        return Err(TypeError::InvalidAccess(format!("empty owner in '{spec}'")));
    }
    match zone {
        Some("") => Err(TypeError::InvalidAccess(format!("empty zone in '{spec}'"))),
        Some(z) if z.contains('#') => {
            Err(TypeError::InvalidAccess(format!("malformed owner specifier '{spec}'")))
        }
        _ => Ok((owner.to_string(), zone.map(str::to_string))),
    }
}

/// A grant of an access level to an owner, optionally qualified by zone.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessControlEntry {
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    pub level: AccessLevel,
}

impl AccessControlEntry {
    pub fn new(owner: impl Into<String>, zone: Option<String>, level: AccessLevel) -> Self {
        Self {
            owner: owner.into(),
            zone,
            level,
        }
    }

    /// Build from an owner specifier (`user` or `user#zone`).
    pub fn from_specifier(spec: &str, level: AccessLevel) -> Result<Self, TypeError> {
        let (owner, zone) = parse_owner_specifier(spec)?;
        Ok(Self { owner, zone, level })
    }

    /// Parse `{owner, level, zone?}`.
    pub fn from_json(json: &Value) -> Result<Self, TypeError> {
        let owner = json
            .get("owner")
            .and_then(Value::as_str)
            .ok_or_else(|| TypeError::InvalidAccess(format!("missing owner in {json}")))?;
        let level = json
            .get("level")
            .and_then(Value::as_str)
            .ok_or_else(|| TypeError::InvalidAccess(format!("missing level in {json}")))?
            .parse()?;
        let zone = match json.get("zone") {
            None | Some(Value::Null) => None,
            Some(Value::String(z)) => Some(z.clone()),
            Some(other) => {
                return Err(TypeError::InvalidAccess(format!("zone is not a string: {other}")))
            }
        };

        let mut entry = Self::from_specifier(owner, level)?;
        if zone.is_some() {
            entry.zone = zone;
        }
        Ok(entry)
    }

    /// `user` or `user#zone`.
    pub fn owner_specifier(&self) -> String {
        match &self.zone {
            Some(zone) => format!("{}#{}", self.owner, zone),
            None => self.owner.clone(),
        }
    }
}
