//! Hierarchical gameplay tags ("Mover.Stance.Crouch")
//!
//! A non-exact query matches the tag itself and any of its descendants.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameplayTag(String);

impl GameplayTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `self` satisfies a query for `query`.
    ///
    /// Exact: names are equal. Otherwise `self` may also be a child of `query`
    /// ("A.B.C" matches a query for "A.B" but not "A.BC").
    pub fn matches(&self, query: &GameplayTag, exact: bool) -> bool {
        if self.0 == query.0 {
            return true;
        }
        if exact || query.0.is_empty() {
            return false;
        }
        self.0.starts_with(&query.0) && self.0.as_bytes().get(query.0.len()) == Some(&b'.')
    }

    pub fn parent(&self) -> Option<GameplayTag> {
        self.0.rfind('.').map(|idx| GameplayTag(self.0[..idx].to_string()))
    }
}

impl fmt::Display for GameplayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GameplayTag {
    fn from(name: &str) -> Self {
        GameplayTag::new(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameplayTagContainer {
    tags: Vec<GameplayTag>,
}

impl GameplayTagContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tag(&mut self, tag: GameplayTag) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn remove_tag(&mut self, tag: &GameplayTag) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        before != self.tags.len()
    }

    pub fn has_tag(&self, query: &GameplayTag, exact: bool) -> bool {
        self.tags.iter().any(|t| t.matches(query, exact))
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameplayTag> {
        self.tags.iter()
    }
}

impl FromIterator<GameplayTag> for GameplayTagContainer {
    fn from_iter<I: IntoIterator<Item = GameplayTag>>(iter: I) -> Self {
        let mut container = GameplayTagContainer::new();
        for tag in iter {
            container.add_tag(tag);
        }
        container
    }
}

/// Deferred "cancel everything carrying this tag" request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagCancellationRequest {
    pub tag: GameplayTag,
    pub exact_match: bool,
}

impl TagCancellationRequest {
    pub fn new(tag: GameplayTag, exact_match: bool) -> Self {
        Self { tag, exact_match }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_matches_parent_query() {
        let crouch = GameplayTag::new("Mover.Stance.Crouch");
        assert!(crouch.matches(&"Mover.Stance".into(), false));
        assert!(!crouch.matches(&"Mover.Stance".into(), true));
        assert!(crouch.matches(&"Mover.Stance.Crouch".into(), true));
    }

    #[test]
    fn test_prefix_without_separator_does_not_match() {
        let tag = GameplayTag::new("Mover.StanceX");
        assert!(!tag.matches(&"Mover.Stance".into(), false));
    }

    #[test]
    fn test_parent_and_container() {
        let tag = GameplayTag::new("A.B.C");
        assert_eq!(tag.parent(), Some(GameplayTag::new("A.B")));
        assert_eq!(GameplayTag::new("A").parent(), None);

        let container: GameplayTagContainer =
            vec![GameplayTag::new("A.B.C"), GameplayTag::new("A.B.C")].into_iter().collect();
        assert_eq!(container.iter().count(), 1);
        assert!(container.has_tag(&"A".into(), false));
        assert!(!container.has_tag(&"A".into(), true));
    }
}
