use indexmap::IndexSet;
use std::fmt;

/// Ordered grouping of module ids sharing a category id.
///
/// Categories are created on first reference and never dropped by the
/// registry; they only become empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    id: String,
    members: IndexSet<String>,
}

impl Category {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: IndexSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn insert(&mut self, module_id: impl Into<String>) -> bool {
        self.members.insert(module_id.into())
    }

    /// Removes a member, keeping the order of the rest.
    pub fn remove(&mut self, module_id: &str) -> bool {
        self.members.shift_remove(module_id)
    }

    pub fn contains(&self, module_id: &str) -> bool {
        self.members.contains(module_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_keep_insertion_order() {
        let mut category = Category::new("util");
        category.insert("ping");
        category.insert("echo");
        category.insert("about");
        category.remove("echo");

        assert_eq!(category.ids().collect::<Vec<_>>(), vec!["ping", "about"]);
        assert!(!category.insert("ping"));
        assert_eq!(category.to_string(), "util");
    }
}
