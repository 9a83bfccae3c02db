use std::collections::HashMap;

use log::trace;

use crate::directory::{AttributeValues, DirectoryEntry};
use crate::pushdown::IDENTITY_COLUMN;

/// The column that receives every attribute of an entry in document mode.
pub const DOCUMENT_COLUMN: &str = "object_body";

/// Requests every user attribute from the server.
const ALL_ATTRIBUTES: &str = "*";

/// Requests no attributes from the server (RFC 4511 section 4.5.1.8).
const NO_ATTRIBUTES: &str = "1.1";

/// One output row with one text cell per projected column.
pub type OutputRow = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    /// Each column receives the attribute of the same name.
    ColumnMapped,
    /// The table is declared as `(dn, object_body)` and the second column
    /// receives every attribute of the entry.
    Document,
}

impl ProjectionMode {
    pub fn detect(columns: &[String]) -> Self {
        match columns {
            [dn, body]
                if dn.eq_ignore_ascii_case(IDENTITY_COLUMN)
                    && body.eq_ignore_ascii_case(DOCUMENT_COLUMN) =>
            {
                ProjectionMode::Document
            }
            _ => ProjectionMode::ColumnMapped,
        }
    }
}

#[derive(Debug, Clone)]
enum ColumnSource {
    Dn,
    Attribute(String),
    Document,
}

/// Maps directory entries to output rows for a fixed list of projected columns.
#[derive(Debug, Clone)]
pub struct Projector {
    mode: ProjectionMode,
    sources: Vec<ColumnSource>,
}

impl Projector {
    /// Creates a projector for the declared `columns` of a table.
    ///
    /// `projection` holds the indices of the columns to produce, in output
    /// order. All declared columns are produced when it is `None`.
    /// Indices out of range are ignored.
    pub fn new(columns: &[String], projection: Option<&[usize]>) -> Self {
        let mode = ProjectionMode::detect(columns);
        let indices = match projection {
            Some(projection) => projection.to_vec(),
            None => (0..columns.len()).collect(),
        };
        let sources = indices
            .into_iter()
            .filter_map(|i| columns.get(i).map(|c| (i, c)))
            .map(|(i, column)| match mode {
                ProjectionMode::Document if i == 1 => ColumnSource::Document,
                _ if column.eq_ignore_ascii_case(IDENTITY_COLUMN) => ColumnSource::Dn,
                _ => ColumnSource::Attribute(column.clone()),
            })
            .collect();
        Self { mode, sources }
    }

    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    pub fn width(&self) -> usize {
        self.sources.len()
    }

    /// The attributes the search must return to fill the projected columns.
    ///
    /// An explicit `configured` list always wins.
    pub fn requested_attributes(&self, configured: &[String]) -> Vec<String> {
        if !configured.is_empty() {
            return configured.to_vec();
        }
        if self.mode == ProjectionMode::Document {
            return vec![ALL_ATTRIBUTES.to_string()];
        }
        let mut attributes: Vec<String> = vec![];
        for source in &self.sources {
            if let ColumnSource::Attribute(name) = source {
                if !attributes.iter().any(|a| a.eq_ignore_ascii_case(name)) {
                    attributes.push(name.clone());
                }
            }
        }
        if attributes.is_empty() {
            attributes.push(NO_ATTRIBUTES.to_string());
        }
        attributes
    }

    pub fn project(&self, entry: &DirectoryEntry) -> OutputRow {
        let lookup = match self.mode {
            ProjectionMode::ColumnMapped => attribute_lookup(entry),
            ProjectionMode::Document => HashMap::new(),
        };
        self.sources
            .iter()
            .map(|source| match source {
                ColumnSource::Dn => Some(entry.dn().to_string()),
                ColumnSource::Document => Some(document_body(entry)),
                ColumnSource::Attribute(name) => match lookup.get(&name.to_lowercase()) {
                    Some(values) => values.flatten(),
                    None => {
                        trace!("entry {} has no attribute {name}", entry.dn());
                        None
                    }
                },
            })
            .collect()
    }
}

/// Indexes the attributes of an entry by lowercase name.
/// The first attribute wins when names differ only in case.
fn attribute_lookup(entry: &DirectoryEntry) -> HashMap<String, &AttributeValues> {
    let mut lookup = HashMap::with_capacity(entry.attributes().len());
    for attribute in entry.attributes() {
        lookup
            .entry(attribute.name.to_lowercase())
            .or_insert(&attribute.values);
    }
    lookup
}

fn document_body(entry: &DirectoryEntry) -> String {
    let mut attributes = entry
        .attributes()
        .iter()
        .filter_map(|a| a.values.flatten().map(|v| (a.name.as_str(), v)))
        .collect::<Vec<_>>();
    attributes.sort_by_key(|(name, _)| name.to_lowercase());
    attributes
        .into_iter()
        .map(|(name, value)| format!("{name} => {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}
