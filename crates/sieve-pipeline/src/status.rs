use std::fmt;

pub const NO_SEARCH_RESULTS: &str = "No search results available. Please run a search first.";
pub const NO_SELECTION: &str = "No results selected. Please select results from the search results.";

/// User-visible outcome of the component's last operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ComponentStatus {
    #[default]
    Idle,
    /// Documents in the store after a build, bounded by the ingest limit.
    Stored(usize),
    Results(usize),
    Selected { selected: usize, total: usize },
    /// A diagnostic shown in place of results.
    Message(String),
}

impl ComponentStatus {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => Ok(()),
            Self::Stored(n) => write!(f, "{n} documents in the vector store"),
            Self::Results(n) => write!(f, "{n} search results"),
            Self::Selected { selected, total } => {
                write!(f, "Returning {selected} selected results out of {total} total results.")
            }
            Self::Message(m) => f.write_str(m),
        }
    }
}
