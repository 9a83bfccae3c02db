use ::serde::de::value::MapDeserializer;
use ::serde::Deserialize;
use ldap_fdw_common::error::{LdapFdwError, LdapFdwResult};

use crate::options::{LdapOptions, ObjectKind};

/// Checks that every key is valid for the given kind of object.
///
/// Keys are compared case-insensitively. The error lists the keys that
/// are valid in this context.
pub fn validate_options(kind: ObjectKind, options: &[(String, String)]) -> LdapFdwResult<()> {
    let allowed = kind.allowed_keys();
    for (key, _) in options {
        if !allowed.contains(&key.to_lowercase().as_str()) {
            return Err(LdapFdwError::configuration(format!(
                "invalid option \"{key}\" for {kind}; valid options in this context are: {}",
                allowed.join(", ")
            )));
        }
    }
    Ok(())
}

/// Validates and deserializes the option bag of a single object.
pub fn load_options(kind: ObjectKind, options: Vec<(String, String)>) -> LdapFdwResult<LdapOptions> {
    validate_options(kind, &options)?;
    let options = options.into_iter().map(|(k, v)| (k.to_lowercase(), v));
    LdapOptions::deserialize(<MapDeserializer<'_, _, ::serde::de::value::Error>>::new(
        options,
    ))
    .map_err(|e| LdapFdwError::configuration(format!("invalid {kind} options: {e}")))
}

#[cfg(test)]
pub fn build_options(options: &[(&str, &str)]) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
