//! Rate limit key construction.

use std::fmt;

use super::policy::Category;

/// The identity usage is tracked under, e.g. `login:1.2.3.4`.
///
/// Composed of the category's key prefix and a subject such as a client
/// address or user id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimitKey {
    /// The category this key belongs to
    pub category: Category,
    /// Who is performing the action
    pub subject: String,
}

impl LimitKey {
    /// Create a key for `subject` under `category`.
    pub fn new(category: Category, subject: impl Into<String>) -> Self {
        Self {
            category,
            subject: subject.into(),
        }
    }

    /// The string the window store is keyed by.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.category.key_prefix(), self.subject)
    }
}

impl fmt::Display for LimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}
