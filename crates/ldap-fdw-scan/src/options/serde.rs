use std::fmt::Display;
use std::str::FromStr;

use ::serde::de::Error;
use ::serde::{Deserialize, Deserializer};

use crate::options::Secret;

pub fn deserialize_non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    if value.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}

pub fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<Secret>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(Some(Secret::new(value)))
}

pub fn deserialize_parsed<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let value = String::deserialize(deserializer)?;
    let value = value.trim();
    value
        .parse::<T>()
        .map(Some)
        .map_err(|e| D::Error::custom(format!("invalid value '{value}': {e}")))
}

pub fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    match deserialize_parsed::<D, u16>(deserializer)? {
        Some(0) => Err(D::Error::custom("port must not be zero")),
        port => Ok(port),
    }
}

/// Parses a comma-separated list, dropping blank entries.
pub fn deserialize_string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(Some(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    ))
}
