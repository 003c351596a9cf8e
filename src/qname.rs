//! Qualified names of schema elements

use std::fmt;

use chrono::NaiveDate;

/// Format of module revision dates (`yyyy-MM-dd`)
pub const REVISION_FORMAT: &str = "%Y-%m-%d";

/// Parse a `yyyy-MM-dd` revision string
pub fn parse_revision(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, REVISION_FORMAT).ok()
}

/// Format a revision date as `yyyy-MM-dd`
pub fn format_revision(revision: NaiveDate) -> String {
    revision.format(REVISION_FORMAT).to_string()
}

/// Canonical identity of a schema element: owning module namespace,
/// module revision and local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    namespace: String,
    revision: Option<NaiveDate>,
    local_name: String,
}

impl QName {
    pub fn new(
        namespace: impl Into<String>,
        revision: Option<NaiveDate>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            revision,
            local_name: local_name.into(),
        }
    }

    /// Another name in the same module
    pub fn sibling(&self, local_name: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            revision: self.revision,
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn revision(&self) -> Option<NaiveDate> {
        self.revision
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// True when both names belong to the same module namespace
    pub fn same_module(&self, other: &QName) -> bool {
        self.namespace == other.namespace
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.revision {
            Some(rev) => write!(
                f,
                "({}?revision={}){}",
                self.namespace,
                format_revision(rev),
                self.local_name
            ),
            None => write!(f, "({}){}", self.namespace, self.local_name),
        }
    }
}
