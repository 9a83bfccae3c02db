use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use ldap_fdw_common::error::{LdapFdwError, LdapFdwResult};
use ldap_fdw_scan::{DirectoryEntry, EffectiveConfig, MemoryDirectory};
use serde::Deserialize;

/// One entry of a directory fixture file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntryRecord {
    dn: String,
    #[serde(default)]
    attributes: BTreeMap<String, Vec<String>>,
}

pub fn parse_entries(json: &str) -> LdapFdwResult<Vec<DirectoryEntry>> {
    let records: Vec<EntryRecord> = serde_json::from_str(json)
        .map_err(|e| LdapFdwError::configuration(format!("invalid directory fixture: {e}")))?;
    Ok(records
        .into_iter()
        .map(|record| {
            record
                .attributes
                .into_iter()
                .fold(DirectoryEntry::new(record.dn), |entry, (name, values)| {
                    entry.with_attribute(name, values)
                })
        })
        .collect())
}

/// Loads a directory fixture file into an in-memory directory.
///
/// The directory accepts the bind credentials of `config`,
/// or only anonymous binds when there are none.
pub fn load_memory_directory(path: &Path, config: &EffectiveConfig) -> LdapFdwResult<MemoryDirectory> {
    let json = fs::read_to_string(path).map_err(|e| {
        LdapFdwError::configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    let directory = MemoryDirectory::new(parse_entries(&json)?);
    Ok(if config.is_anonymous() {
        directory
    } else {
        directory
            .with_user(config.user_dn.clone(), config.password.expose())
            .with_authentication_required()
    })
}
