use crate::model::{Bookmark, Document, NewBookmark, NewProject, Project};
use chrono::Utc;
use serde_json::Map;
use std::time::{Duration, Instant};

/// In-memory document plus its dirty flag. Every write to the document goes
/// through the methods here.
#[derive(Debug, Clone, Default)]
pub struct BookmarkStore {
    data: Document,
    dirty: bool,
    last_mutation: Option<Instant>,
}

impl BookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a document that matches what is on disk.
    pub fn from_document(data: Document) -> Self {
        Self {
            data,
            dirty: false,
            last_mutation: None,
        }
    }

    pub fn document(&self) -> &Document {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Swap in a document loaded from disk. Unsaved edits are discarded.
    pub fn replace(&mut self, data: Document) {
        self.data = data;
        self.mark_clean();
    }

    /// Called after the current document has been written successfully.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        self.last_mutation = None;
    }

    /// Time since the most recent unsaved mutation, if any.
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.last_mutation.map(|at| now.saturating_duration_since(at))
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.last_mutation = Some(Instant::now());
    }

    fn next_id(&mut self) -> u64 {
        self.data.id_counter += 1;
        self.data.id_counter
    }

    // ── Bookmarks ──────────────────────────────────────────────────────────

    pub fn add_bookmark(&mut self, fields: NewBookmark) -> Bookmark {
        let bookmark = Bookmark {
            id: self.next_id(),
            url: fields.url,
            title: fields.title,
            note: fields.note,
            tags: fields.tags,
            summary: fields.summary,
            last_updated: Utc::now(),
            project_id: None,
            extra: Map::new(),
        };
        self.data.bookmarks.insert(0, bookmark.clone());
        self.touch();
        bookmark
    }

    /// Replace the stored bookmark with the same id. Returns false if there is none.
    pub fn update_bookmark(&mut self, mut updated: Bookmark) -> bool {
        let Some(slot) = self.data.bookmarks.iter_mut().find(|b| b.id == updated.id) else {
            return false;
        };
        updated.last_updated = Utc::now();
        updated.project_id = None;
        *slot = updated;
        self.touch();
        true
    }

    /// Remove a bookmark and every project reference to it.
    pub fn delete_bookmark(&mut self, id: u64) -> bool {
        let before = self.data.bookmarks.len();
        self.data.bookmarks.retain(|b| b.id != id);
        if self.data.bookmarks.len() == before {
            return false;
        }
        for project in &mut self.data.projects {
            project.bookmarks.remove(&id);
        }
        self.touch();
        true
    }

    pub fn bookmark(&self, id: u64) -> Option<&Bookmark> {
        self.data.bookmarks.iter().find(|b| b.id == id)
    }

    /// Newest first.
    pub fn sorted_bookmarks(&self) -> Vec<&Bookmark> {
        let mut list: Vec<&Bookmark> = self.data.bookmarks.iter().collect();
        list.sort_by(|a, b| b.id.cmp(&a.id));
        list
    }

    // ── Projects ───────────────────────────────────────────────────────────

    pub fn add_project(&mut self, fields: NewProject) -> Project {
        let project = Project {
            id: self.next_id(),
            title: fields.title,
            note: fields.note,
            bookmarks: fields.bookmarks,
            last_updated: Utc::now(),
            extra: Map::new(),
        };
        self.data.projects.insert(0, project.clone());
        self.touch();
        project
    }

    pub fn update_project(&mut self, mut updated: Project) -> bool {
        let Some(slot) = self.data.projects.iter_mut().find(|p| p.id == updated.id) else {
            return false;
        };
        updated.last_updated = Utc::now();
        *slot = updated;
        self.touch();
        true
    }

    /// Remove a project. Bookmarks it referenced are left alone.
    pub fn delete_project(&mut self, id: u64) -> bool {
        let before = self.data.projects.len();
        self.data.projects.retain(|p| p.id != id);
        if self.data.projects.len() == before {
            return false;
        }
        self.touch();
        true
    }

    pub fn project(&self, id: u64) -> Option<&Project> {
        self.data.projects.iter().find(|p| p.id == id)
    }

    pub fn sorted_projects(&self) -> Vec<&Project> {
        let mut list: Vec<&Project> = self.data.projects.iter().collect();
        list.sort_by(|a, b| b.id.cmp(&a.id));
        list
    }

    pub fn projects_containing(&self, bookmark_id: u64) -> Vec<&Project> {
        self.sorted_projects()
            .into_iter()
            .filter(|p| p.bookmarks.contains(&bookmark_id))
            .collect()
    }
}
