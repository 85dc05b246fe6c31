/// Named collections of the durable store and their redb table definitions.
use std::fmt;

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

/// Project table: singleton key → JSON snapshot of the live state.
const PROJECT_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("project");

/// Task table: task id → JSON task record.
const TASKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Repo history table: item id → JSON history item.
const REPO_HISTORY_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("repo_history");

/// Article history table: item id → JSON history item.
const ARTICLE_HISTORY_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("article_history");

/// Internal metadata table: `"schema"` → bincode-serialized `SchemaMeta`.
pub(crate) const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// A named partition of the store holding records of one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    /// Singleton project snapshot, keyed by a caller-supplied constant.
    Project,
    /// Task records keyed by their own `id`.
    Tasks,
    /// Repo history log keyed by item `id`.
    RepoHistory,
    /// Article history log keyed by item `id`.
    ArticleHistory,
}

impl Collection {
    /// Every user-visible collection, in creation order.
    pub const ALL: [Collection; 4] = [
        Collection::Project,
        Collection::Tasks,
        Collection::RepoHistory,
        Collection::ArticleHistory,
    ];

    /// The on-disk table name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Tasks => "tasks",
            Self::RepoHistory => "repo_history",
            Self::ArticleHistory => "article_history",
        }
    }

    pub(crate) fn table(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Self::Project => PROJECT_TABLE,
            Self::Tasks => TASKS_TABLE,
            Self::RepoHistory => REPO_HISTORY_TABLE,
            Self::ArticleHistory => ARTICLE_HISTORY_TABLE,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which of the two history logs a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryLogKind {
    Repo,
    Article,
}

impl HistoryLogKind {
    /// The collection backing this log.
    pub const fn collection(self) -> Collection {
        match self {
            Self::Repo => Collection::RepoHistory,
            Self::Article => Collection::ArticleHistory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_tables() {
        for collection in Collection::ALL {
            assert_eq!(collection.to_string(), collection.name());
        }
        assert_eq!(Collection::RepoHistory.name(), "repo_history");
    }

    #[test]
    fn test_log_kind_collections_differ() {
        assert_eq!(HistoryLogKind::Repo.collection(), Collection::RepoHistory);
        assert_eq!(
            HistoryLogKind::Article.collection(),
            Collection::ArticleHistory
        );
    }
}
