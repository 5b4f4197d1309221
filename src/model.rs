use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Schema written by this crate. Files without `schemaVersion` are legacy v1.
pub const SCHEMA_VERSION: u32 = 2;

// ---- Records ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub note: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub summary: String,
    #[serde(default, deserialize_with = "nullable")]
    pub last_updated: DateTime<Utc>,
    /// v1 files referenced a single project from the bookmark side.
    #[serde(default, skip_serializing)]
    pub(crate) project_id: Option<u64>,
    /// Keys written by other tools, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Bookmark fields supplied by the caller; id and timestamp are assigned by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
    pub note: String,
    pub tags: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub note: String,
    /// Ids of the bookmarks this project groups.
    #[serde(default, deserialize_with = "nullable")]
    pub bookmarks: BTreeSet<u64>,
    #[serde(default, deserialize_with = "nullable")]
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProject {
    pub title: String,
    pub note: String,
    pub bookmarks: BTreeSet<u64>,
}

// ---- Document ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, deserialize_with = "nullable")]
    pub schema_version: u32,
    #[serde(default, deserialize_with = "nullable")]
    pub id_counter: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub projects: Vec<Project>,
    #[serde(default, deserialize_with = "nullable")]
    pub bookmarks: Vec<Bookmark>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id_counter: 0,
            projects: Vec::new(),
            bookmarks: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Document {
    /// Largest id held by any bookmark or project, 0 when empty.
    pub fn max_id(&self) -> u64 {
        self.bookmarks
            .iter()
            .map(|b| b.id)
            .chain(self.projects.iter().map(|p| p.id))
            .max()
            .unwrap_or(0)
    }

    /// Pretty JSON with two-space indentation, fields in declaration order.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Treat an explicit `null` the same as a missing key.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse raw file contents into a normalized, current-schema document.
pub fn parse(raw: &[u8]) -> Result<Document, ParseError> {
    let doc: Document = serde_json::from_slice(raw)?;
    Ok(normalize(doc))
}

/// Bring a freshly deserialized document up to the current schema.
///
/// Missing collections and counter were already defaulted by serde. This
/// folds v1 bookmark-side project references into the project sets and
/// makes sure the counter can never hand out an id that is already taken.
pub fn normalize(mut doc: Document) -> Document {
    if doc.schema_version < SCHEMA_VERSION {
        migrate_v1(&mut doc);
        doc.schema_version = SCHEMA_VERSION;
    }
    for bookmark in &mut doc.bookmarks {
        bookmark.project_id = None;
    }

    let max_id = doc.max_id();
    if doc.id_counter < max_id {
        log::warn!(
            "idCounter {} is below the highest id {}, raising it",
            doc.id_counter,
            max_id
        );
        doc.id_counter = max_id;
    }
    doc
}

fn migrate_v1(doc: &mut Document) {
    let refs: Vec<(u64, u64)> = doc
        .bookmarks
        .iter()
        .filter_map(|b| b.project_id.map(|pid| (pid, b.id)))
        .collect();

    for (project_id, bookmark_id) in refs {
        match doc.projects.iter_mut().find(|p| p.id == project_id) {
            Some(project) => {
                project.bookmarks.insert(bookmark_id);
            }
            None => log::warn!(
                "bookmark {} references missing project {}, dropping reference",
                bookmark_id,
                project_id
            ),
        }
    }
}

// ---- Tests ----
