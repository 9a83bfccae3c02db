pub mod directory;
pub mod options;
pub mod projection;
pub mod pushdown;
pub mod scan;
pub mod session;

pub use directory::{
    AttributeValues, DirectoryAttribute, DirectoryConnection, DirectoryConnector, DirectoryEntry,
    DirectoryError, Ldap3Connector, MemoryDirectory, SearchRequest,
};
pub use options::{
    resolve_options, resolve_table_options, EffectiveConfig, MemoryOptionCatalog, ObjectKind,
    OptionCatalog, OptionLayers,
};
pub use projection::{OutputRow, ProjectionMode, Projector};
pub use pushdown::{analyze_filters, filter_pushdown_support, Pushdown, IDENTITY_COLUMN};
pub use scan::{begin_foreign_scan, DirectoryScan, ScanEstimate, ScanRequest};
pub use session::{compose_filter, DirectorySession, SessionState};
