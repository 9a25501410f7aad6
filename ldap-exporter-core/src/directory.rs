//! Search requests and the directory client seam.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::DirectoryError;

/// Filter used when a source does not configure one.
pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";

/// LDAP search scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    #[default]
    BaseObject,
    SingleLevel,
    WholeSubtree,
}

impl Scope {
    /// Parse a configured scope.
    ///
    /// Accepts the short names `base`, `single` and `subtree` as well as the
    /// protocol names `Base Object`, `Single Level` and `Whole Subtree`.
    pub fn parse(choice: &str) -> Option<Self> {
        match choice {
            "base" | "Base Object" => Some(Scope::BaseObject),
            "single" | "Single Level" => Some(Scope::SingleLevel),
            "subtree" | "Whole Subtree" => Some(Scope::WholeSubtree),
            _ => None,
        }
    }

    /// Protocol name of this scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::BaseObject => "Base Object",
            Scope::SingleLevel => "Single Level",
            Scope::WholeSubtree => "Whole Subtree",
        }
    }
}

/// Alias dereferencing policy for a search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DerefAliases {
    Never,
    InSearching,
    FindingBaseObject,
    #[default]
    Always,
}

impl DerefAliases {
    /// Parse a configured deref policy: `never`, `search`, `base` or `always`.
    pub fn parse(choice: &str) -> Option<Self> {
        match choice {
            "never" => Some(DerefAliases::Never),
            "search" => Some(DerefAliases::InSearching),
            "base" => Some(DerefAliases::FindingBaseObject),
            "always" => Some(DerefAliases::Always),
            _ => None,
        }
    }
}

/// A fully specified search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: Scope,
    pub deref: DerefAliases,
    /// Maximum entries returned; 0 leaves it to the server.
    pub size_limit: i32,
    /// Maximum seconds spent; 0 leaves it to the server.
    pub time_limit: i32,
    pub filter: String,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Create a request with no size or time limit.
    pub fn new(
        base_dn: impl Into<String>,
        scope: Scope,
        deref: DerefAliases,
        filter: impl Into<String>,
        attributes: Vec<String>,
    ) -> Self {
        Self {
            base_dn: base_dn.into(),
            scope,
            deref,
            size_limit: 0,
            time_limit: 0,
            filter: filter.into(),
            attributes,
        }
    }
}

impl fmt::Display for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search='{}', filter: '{}'", self.base_dn, self.filter)
    }
}

/// One attribute of a search result entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttribute {
    pub name: String,
    pub values: Vec<String>,
}

impl EntryAttribute {
    pub fn new<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// One search result entry, with attributes in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: Vec<EntryAttribute>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute (builder style).
    pub fn with_attribute<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        self.attributes.push(EntryAttribute::new(name, values));
        self
    }
}

/// A directory service that can run searches.
///
/// Implementations are shared by every source of an exporter and are used
/// serially within a scrape.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// In-memory directory keyed by base DN.
///
/// Searches for an unknown base DN fail with a "no such object" error, like
/// a server would. Every request is recorded.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, Vec<DirectoryEntry>>,
    failures: HashMap<String, String>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer searches under `base_dn` with `entries`.
    pub fn with_entries(mut self, base_dn: impl Into<String>, entries: Vec<DirectoryEntry>) -> Self {
        self.entries.insert(base_dn.into(), entries);
        self
    }

    /// Fail searches under `base_dn` with `message`.
    pub fn with_failure(mut self, base_dn: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(base_dn.into(), message.into());
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.requests.lock().push(request.clone());

        if let Some(message) = self.failures.get(&request.base_dn) {
            return Err(DirectoryError::Search(message.clone()));
        }

        self.entries
            .get(&request.base_dn)
            .cloned()
            .ok_or_else(|| {
                DirectoryError::Search(format!("no such object: '{}'", request.base_dn))
            })
    }
}
