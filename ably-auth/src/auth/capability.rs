//! Capability model: the permission scope embedded in token requests.
//!
//! A capability maps resource paths to the operations permitted on them.
//! Its canonical JSON string is part of the HMAC-signed payload, so
//! serialization must be byte-stable: keys sorted, operations sorted and
//! deduplicated, compact separators, and the empty capability rendered as
//! `""` (the protocol's "unrestricted" convention).

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::{AblyError, AblyResult};

/// Operations permitted on a single resource path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationSet {
    /// The `"*"` sentinel: every operation
    Wildcard,
    /// An explicit, sorted, deduplicated list of operation names
    Operations(Vec<String>),
}

/// A permission scope: resource path -> permitted operations
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Capability {
    resources: BTreeMap<String, OperationSet>,
}

impl Capability {
    /// The unrestricted capability: `"*"` on the root path.
    pub fn wildcard() -> Self {
        let mut resources = BTreeMap::new();
        resources.insert("*".to_string(), OperationSet::Wildcard);
        Self { resources }
    }

    /// Parse a capability from its string form: `""` (empty), `"*"`
    /// (wildcard sentinel), or a JSON object.
    pub fn parse(raw: &str) -> AblyResult<Self> {
        match raw {
            "" => Ok(Self::default()),
            "*" => Ok(Self::wildcard()),
            _ => {
                let value: Value = serde_json::from_str(raw).map_err(|e| {
                    AblyError::validation(format!("malformed capability JSON: {}", e))
                })?;
                Self::from_value(&value)
            }
        }
    }

    /// Normalize a raw JSON mapping into a capability.
    pub fn from_value(value: &Value) -> AblyResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            AblyError::validation("capability must be a mapping of path to operations")
        })?;

        let mut resources = BTreeMap::new();
        for (path, ops) in object {
            resources.insert(path.clone(), parse_operations(path, ops)?);
        }
        Ok(Self { resources })
    }

    /// Add a resource path with an explicit operation list.
    pub fn add_resource(&mut self, path: impl Into<String>, ops: &[&str]) {
        let mut ops: Vec<String> = ops.iter().map(|s| s.to_string()).collect();
        ops.sort();
        ops.dedup();
        self.resources
            .insert(path.into(), OperationSet::Operations(ops));
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Canonical JSON string: sorted keys, compact separators. The empty
    /// capability canonicalizes to `""`, never `"{}"`.
    pub fn to_canonical_string(&self) -> String {
        if self.resources.is_empty() {
            return String::new();
        }
        let mut object = Map::new();
        for (path, ops) in &self.resources {
            let value = match ops {
                OperationSet::Wildcard => Value::String("*".to_string()),
                OperationSet::Operations(names) => Value::Array(
                    names.iter().map(|n| Value::String(n.clone())).collect(),
                ),
            };
            object.insert(path.clone(), value);
        }
        // serde_json's Map keeps keys sorted, so this is deterministic.
        Value::Object(object).to_string()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

fn parse_operations(path: &str, ops: &Value) -> AblyResult<OperationSet> {
    match ops {
        Value::String(s) if s == "*" => Ok(OperationSet::Wildcard),
        Value::Array(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(name) => names.push(name.clone()),
                    other => {
                        return Err(AblyError::validation(format!(
                            "operation for '{}' must be a string, got {}",
                            path, other
                        )))
                    }
                }
            }
            names.sort();
            names.dedup();
            Ok(OperationSet::Operations(names))
        }
        other => Err(AblyError::validation(format!(
            "operations for '{}' must be a list or \"*\", got {}",
            path, other
        ))),
    }
}
