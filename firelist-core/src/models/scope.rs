use std::fmt;

/// True when `id` names a document directly inside a collection.
///
/// Anything with a `/`, or a `.`/`..` segment, would resolve outside the
/// scope once joined onto a collection path.
pub fn is_document_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}

/// Per-user namespace that every read and write for that user goes through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    app_id: String,
    user_id: String,
}

impl Scope {
    pub fn new(app_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Collection path relative to the database root:
    /// `artifacts/{app_id}/users/{user_id}/todos`.
    pub fn collection_path(&self) -> String {
        format!("artifacts/{}/users/{}/todos", self.app_id, self.user_id)
    }

    pub fn document_path(&self, id: &str) -> String {
        debug_assert!(is_document_id(id), "document id escapes scope: {:?}", id);
        format!("{}/{}", self.collection_path(), id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection_path())
    }
}
