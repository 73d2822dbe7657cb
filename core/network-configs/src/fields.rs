//! Explicit field-by-field access to a YAML mapping, attributing every failure to the entity
//! being parsed.
use crate::topology::TopologyError;
use serde_yaml::{Mapping, Value};
use std::net::IpAddr;
use std::str::FromStr;

pub(crate) struct Fields<'a> {
    entity: String,
    map: &'a Mapping,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(entity: impl Into<String>, value: &'a Value) -> Result<Self, TopologyError> {
        let entity = entity.into();
        match value {
            Value::Mapping(map) => Ok(Self { entity, map }),
            other => Err(TopologyError::InvalidField {
                entity,
                field: "<body>".to_string(),
                reason: format!("expected a mapping, found {}", describe(other)),
            }),
        }
    }

    /// Explicit `null` counts as absent.
    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    pub(crate) fn required(&self, key: &str) -> Result<&'a Value, TopologyError> {
        self.get(key).ok_or_else(|| TopologyError::MissingRequiredField {
            entity: self.entity.clone(),
            field: key.to_string(),
        })
    }

    pub(crate) fn invalid(&self, key: &str, reason: impl Into<String>) -> TopologyError {
        TopologyError::InvalidField {
            entity: self.entity.clone(),
            field: key.to_string(),
            reason: reason.into(),
        }
    }

    fn scalar(&self, key: &str, value: &Value) -> Result<String, TopologyError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(self.invalid(key, format!("expected a scalar, found {}", describe(other)))),
        }
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<String, TopologyError> {
        self.scalar(key, self.required(key)?)
    }

    pub(crate) fn optional_str(&self, key: &str) -> Result<Option<String>, TopologyError> {
        self.get(key).map(|value| self.scalar(key, value)).transpose()
    }

    pub(crate) fn required_parsed<T: FromStr>(&self, key: &str) -> Result<T, TopologyError>
    where
        T::Err: std::fmt::Display,
    {
        let raw = self.required_str(key)?;
        raw.parse().map_err(|err| self.invalid(key, format!("{raw:?}: {err}")))
    }

    pub(crate) fn optional_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, TopologyError>
    where
        T::Err: std::fmt::Display,
    {
        match self.optional_str(key)? {
            None => Ok(None),
            Some(raw) => {
                raw.parse().map(Some).map_err(|err| self.invalid(key, format!("{raw:?}: {err}")))
            }
        }
    }

    pub(crate) fn required_ip(&self, key: &str) -> Result<IpAddr, TopologyError> {
        self.required_parsed(key)
    }

    pub(crate) fn optional_ip(&self, key: &str) -> Result<Option<IpAddr>, TopologyError> {
        self.optional_parsed(key)
    }

    pub(crate) fn optional_list(&self, key: &str) -> Result<Option<&'a [Value]>, TopologyError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Sequence(seq)) => Ok(Some(seq.as_slice())),
            Some(other) => {
                Err(self.invalid(key, format!("expected a list, found {}", describe(other))))
            }
        }
    }

    pub(crate) fn required_list(&self, key: &str) -> Result<&'a [Value], TopologyError> {
        self.required(key)?;
        self.optional_list(key)?.ok_or_else(|| TopologyError::MissingRequiredField {
            entity: self.entity.clone(),
            field: key.to_string(),
        })
    }

    /// A list of plain scalars.
    pub(crate) fn required_str_list(&self, key: &str) -> Result<Vec<String>, TopologyError> {
        self.required_list(key)?.iter().map(|value| self.scalar(key, value)).collect()
    }

    pub(crate) fn optional_str_list(&self, key: &str) -> Result<Vec<String>, TopologyError> {
        match self.optional_list(key)? {
            None => Ok(Vec::new()),
            Some(items) => items.iter().map(|value| self.scalar(key, value)).collect(),
        }
    }

    /// A list of single-key mappings `- <name>: <body>`, as used for nodes, accounts and
    /// contracts.
    pub(crate) fn named_entries(
        &self,
        key: &str,
        items: &'a [Value],
    ) -> Result<Vec<(String, &'a Value)>, TopologyError> {
        items
            .iter()
            .map(|item| match item {
                Value::Mapping(map) if map.len() == 1 => {
                    let (name, body) = map.iter().next().ok_or_else(|| self.invalid(key, ""))?;
                    let name = self.scalar(key, name)?;
                    Ok((name, body))
                }
                other => Err(self.invalid(
                    key,
                    format!("expected a single-key mapping `<name>: ...`, found {}", describe(other)),
                )),
            })
            .collect()
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
