use serde::{Deserialize, Serialize};

/// Which fields a search is meant to cover.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SearchDepth {
    NameOnly,
    Details,
}

/// Column set a search matches against.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MatchPredicate {
    Name,
}

impl SearchDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchDepth::NameOnly => "name",
            SearchDepth::Details => "details",
        }
    }

    /// Details searches still match on the package name only; description
    /// matching has not been agreed on yet.
    pub fn predicate(self) -> MatchPredicate {
        match self {
            SearchDepth::NameOnly | SearchDepth::Details => MatchPredicate::Name,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchTask {
    pub query: String,
    /// Accepted and carried through, not applied to matching.
    pub filter: String,
    pub depth: SearchDepth,
}

impl SearchTask {
    pub fn new(query: impl Into<String>, filter: impl Into<String>, depth: SearchDepth) -> Self {
        Self {
            query: query.into(),
            filter: filter.into(),
            depth,
        }
    }

    pub fn by_name(query: impl Into<String>) -> Self {
        Self::new(query, "", SearchDepth::NameOnly)
    }

    pub fn by_details(query: impl Into<String>) -> Self {
        Self::new(query, "", SearchDepth::Details)
    }

    /// Substring `LIKE` pattern for this query. Spaces become `%` so
    /// multi-word queries match the words in order with anything between.
    pub fn like_pattern(&self) -> String {
        format!("%{}%", self.query.replace(' ', "%"))
    }
}
