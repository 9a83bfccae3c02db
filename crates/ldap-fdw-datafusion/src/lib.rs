mod physical_plan;
mod table_provider;

pub use physical_plan::LdapScanExec;
pub use table_provider::LdapTableProvider;
