use std::collections::HashMap;

use ldap_fdw_common::error::{LdapFdwError, LdapFdwResult};

use crate::options::{validate_options, ObjectKind};

/// The raw option bags that apply to one foreign table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionLayers {
    pub table: Vec<(String, String)>,
    pub server: Vec<(String, String)>,
    pub user_mapping: Vec<(String, String)>,
}

/// Looks up the options declared for a foreign table,
/// its server, and the user mapping for that server.
pub trait OptionCatalog: Send + Sync {
    fn option_layers(&self, table: &str) -> LdapFdwResult<OptionLayers>;
}

#[derive(Debug, Clone)]
struct ForeignTableEntry {
    server: String,
    options: Vec<(String, String)>,
}

/// An option catalog held in memory.
///
/// Options are validated when they are declared,
/// so an invalid key never reaches a scan.
#[derive(Debug, Clone, Default)]
pub struct MemoryOptionCatalog {
    servers: HashMap<String, Vec<(String, String)>>,
    user_mappings: HashMap<String, Vec<(String, String)>>,
    tables: HashMap<String, ForeignTableEntry>,
}

impl MemoryOptionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_server(
        &mut self,
        name: impl Into<String>,
        options: Vec<(String, String)>,
    ) -> LdapFdwResult<()> {
        validate_options(ObjectKind::Server, &options)?;
        self.servers.insert(name.into(), options);
        Ok(())
    }

    pub fn create_user_mapping(
        &mut self,
        server: &str,
        options: Vec<(String, String)>,
    ) -> LdapFdwResult<()> {
        self.require_server(server)?;
        validate_options(ObjectKind::UserMapping, &options)?;
        self.user_mappings.insert(server.to_string(), options);
        Ok(())
    }

    pub fn create_foreign_table(
        &mut self,
        name: impl Into<String>,
        server: &str,
        options: Vec<(String, String)>,
    ) -> LdapFdwResult<()> {
        self.require_server(server)?;
        validate_options(ObjectKind::Table, &options)?;
        self.tables.insert(
            name.into(),
            ForeignTableEntry {
                server: server.to_string(),
                options,
            },
        );
        Ok(())
    }

    fn require_server(&self, server: &str) -> LdapFdwResult<()> {
        if self.servers.contains_key(server) {
            Ok(())
        } else {
            Err(LdapFdwError::configuration(format!(
                "server \"{server}\" does not exist"
            )))
        }
    }
}

impl OptionCatalog for MemoryOptionCatalog {
    fn option_layers(&self, table: &str) -> LdapFdwResult<OptionLayers> {
        let entry = self.tables.get(table).ok_or_else(|| {
            LdapFdwError::configuration(format!("foreign table \"{table}\" does not exist"))
        })?;
        let server = self.servers.get(&entry.server).ok_or_else(|| {
            LdapFdwError::configuration(format!("server \"{}\" does not exist", entry.server))
        })?;
        let user_mapping = self.user_mappings.get(&entry.server).ok_or_else(|| {
            LdapFdwError::configuration(format!(
                "user mapping not found for server \"{}\"",
                entry.server
            ))
        })?;
        Ok(OptionLayers {
            table: entry.options.clone(),
            server: server.clone(),
            user_mapping: user_mapping.clone(),
        })
    }
}
