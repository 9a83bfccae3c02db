//! Shared fixtures for scan lifecycle tests.

use ldap_fdw_scan::{DirectoryEntry, MemoryDirectory, MemoryOptionCatalog};

pub const ADMIN_DN: &str = "cn=admin,dc=example,dc=org";
pub const ADMIN_PASSWORD: &str = "secret";
pub const PEOPLE_DN: &str = "ou=people,dc=example,dc=org";
pub const ALICE_DN: &str = "uid=alice,ou=people,dc=example,dc=org";
pub const BOB_DN: &str = "uid=bob,ou=people,dc=example,dc=org";

pub fn options(options: &[(&str, &str)]) -> Vec<(String, String)> {
    options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Two people under `ou=people`, one group under `ou=groups`.
pub fn people_directory() -> MemoryDirectory {
    MemoryDirectory::new(vec![
        DirectoryEntry::new(PEOPLE_DN).with_attribute("objectClass", ["organizationalUnit"]),
        DirectoryEntry::new(ALICE_DN)
            .with_attribute("objectClass", ["inetOrgPerson"])
            .with_attribute("cn", ["alice"])
            .with_attribute("mail", ["a", "b"]),
        DirectoryEntry::new(BOB_DN)
            .with_attribute("objectClass", ["inetOrgPerson"])
            .with_attribute("cn", ["bob"])
            .with_attribute("mail", ["bob@example.org"]),
        DirectoryEntry::new("cn=admins,ou=groups,dc=example,dc=org")
            .with_attribute("objectClass", ["groupOfNames"])
            .with_attribute("cn", ["admins"]),
    ])
    .with_user(ADMIN_DN, ADMIN_PASSWORD)
}

/// Declares `people` on server `directory` with a user mapping for the admin.
#[allow(dead_code)]
pub fn people_catalog(table_options: &[(&str, &str)]) -> MemoryOptionCatalog {
    let mut catalog = MemoryOptionCatalog::new();
    catalog
        .create_server("directory", options(&[("address", "ldap.example.org")]))
        .unwrap();
    catalog
        .create_user_mapping(
            "directory",
            options(&[("user_dn", ADMIN_DN), ("password", ADMIN_PASSWORD)]),
        )
        .unwrap();
    let mut table = table_options.to_vec();
    if !table.iter().any(|(k, _)| *k == "base_dn") {
        table.push(("base_dn", PEOPLE_DN));
    }
    catalog
        .create_foreign_table("people", "directory", options(&table))
        .unwrap();
    catalog
}
