//! Runtime configuration for the search layer.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file, and `ENTITY_SEARCH_*` environment variables (a `.env` file is
//! honoured through `dotenvy`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Highest edit distance the fuzzy text variant will use.
pub const MAX_FUZZY_EDITS: u8 = 2;

/// How the text query combines terms across the searchable field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextOperator {
    And,
    #[default]
    Or,
}

impl std::str::FromStr for TextOperator {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(SearchError::Config(format!(
                "unknown text operator `{other}` (expected `and` or `or`)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Directory holding one sub-directory per physical index.
    pub index_root: PathBuf,
    /// Heap budget handed to each tantivy writer.
    pub writer_heap_bytes: usize,
    pub default_operator: TextOperator,
    /// Max edit distance for the `query~N` variant (clamped to [`MAX_FUZZY_EDITS`]).
    pub fuzzy_max_edits: u8,
    /// Page size used by sync when the caller does not pass one.
    pub batch_size: usize,
    /// Whether a sync pass also deletes index documents missing from the source.
    pub delete_missing: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_root: default_index_root(),
            writer_heap_bytes: 50_000_000,
            default_operator: TextOperator::Or,
            fuzzy_max_edits: 1,
            batch_size: 500,
            delete_missing: true,
        }
    }
}

impl SearchConfig {
    /// Config rooted at `index_root`, everything else default.
    pub fn with_root(index_root: impl Into<PathBuf>) -> Self {
        Self {
            index_root: index_root.into(),
            ..Self::default()
        }
    }

    /// Load config from environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)
            .map_err(|e| SearchError::Config(format!("invalid search config: {e}")))?;
        cfg.validated()
    }

    /// Read a TOML file, then let environment variables override it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&raw)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = dotenvy::var("ENTITY_SEARCH_INDEX_DIR") {
            self.index_root = PathBuf::from(path);
        }

        if let Ok(val) = dotenvy::var("ENTITY_SEARCH_WRITER_HEAP_BYTES")
            && let Ok(n) = val.parse()
        {
            self.writer_heap_bytes = n;
        }

        if let Ok(val) = dotenvy::var("ENTITY_SEARCH_DEFAULT_OPERATOR") {
            self.default_operator = val.parse()?;
        }

        if let Ok(val) = dotenvy::var("ENTITY_SEARCH_FUZZY_MAX_EDITS")
            && let Ok(n) = val.parse()
        {
            self.fuzzy_max_edits = n;
        }

        if let Ok(val) = dotenvy::var("ENTITY_SEARCH_BATCH_SIZE")
            && let Ok(n) = val.parse()
        {
            self.batch_size = n;
        }

        if let Ok(val) = dotenvy::var("ENTITY_SEARCH_DELETE_MISSING") {
            self.delete_missing = !matches!(val.as_str(), "0" | "false" | "no");
        }

        *self = std::mem::take(self).validated()?;
        Ok(())
    }

    fn validated(mut self) -> Result<Self> {
        if self.batch_size == 0 {
            return Err(SearchError::Config("batch_size must be positive".into()));
        }
        // tantivy rejects writer budgets below 15 MB
        if self.writer_heap_bytes < 15_000_000 {
            return Err(SearchError::Config(format!(
                "writer_heap_bytes {} is below the 15MB minimum",
                self.writer_heap_bytes
            )));
        }
        self.fuzzy_max_edits = self.fuzzy_max_edits.min(MAX_FUZZY_EDITS);
        Ok(self)
    }
}

pub fn default_index_root() -> PathBuf {
    directories::ProjectDirs::from("com", "entity-search", "entity-search")
        .map(|dirs| dirs.data_dir().join("index"))
        .unwrap_or_else(|| PathBuf::from("search-index"))
}
