//! Action categories and the policies that govern them.
//!
//! Categories are a closed set. Every category has a default [`Policy`];
//! a [`PolicyTable`] may override limits and windows once at startup and
//! is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// Longest window a policy may use.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A semantic action category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Credential checks
    Login,
    /// Mutations from the admin panel
    AdminAction,
    /// Generic API reads
    ApiCall,
}

impl Category {
    /// Every known category.
    pub const ALL: [Category; 3] = [Category::Login, Category::AdminAction, Category::ApiCall];

    /// The configuration name of this category.
    pub fn name(&self) -> &'static str {
        match self {
            Category::Login => "login",
            Category::AdminAction => "admin_action",
            Category::ApiCall => "api_call",
        }
    }

    /// Prefix used when building keys for this category.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Category::Login => "login",
            Category::AdminAction => "admin-action",
            Category::ApiCall => "api",
        }
    }

    /// The built-in policy for this category.
    pub fn default_policy(&self) -> Policy {
        match self {
            Category::Login => Policy::new(5, Duration::from_secs(15 * 60)),
            Category::AdminAction => Policy::new(100, Duration::from_secs(60)),
            Category::ApiCall => Policy::new(1000, Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = TurnstileError;

    /// Accepts `login`, `admin_action`, `api_call` in any case, with `-` or `_`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| TurnstileError::UnknownCategory(s.to_string()))
    }
}

/// How many attempts a category admits per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Maximum admitted attempts per window
    pub limit: u32,
    /// Length of a window
    pub window: Duration,
}

impl Policy {
    /// Create a policy. Use [`Policy::validate`] before installing it.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// Reject policies that could never admit anything or whose window
    /// exceeds [`MAX_WINDOW`].
    pub fn validate(&self, category: Category) -> Result<()> {
        if self.limit == 0 {
            return Err(TurnstileError::InvalidPolicy {
                category: category.to_string(),
                reason: "limit must be greater than zero".to_string(),
            });
        }
        if self.window.is_zero() {
            return Err(TurnstileError::InvalidPolicy {
                category: category.to_string(),
                reason: "window must be greater than zero".to_string(),
            });
        }
        if self.window > MAX_WINDOW {
            return Err(TurnstileError::InvalidPolicy {
                category: category.to_string(),
                reason: format!(
                    "window must be at most {} seconds",
                    MAX_WINDOW.as_secs()
                ),
            });
        }
        Ok(())
    }
}

/// A policy override as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    /// Number of attempts allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl From<PolicyOverride> for Policy {
    fn from(o: PolicyOverride) -> Self {
        Policy::new(o.limit, Duration::from_secs(o.window_secs))
    }
}

/// The category to policy mapping, fixed once built.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    policies: HashMap<Category, Policy>,
}

impl PolicyTable {
    /// A table with no policies; build it up with [`PolicyTable::with_policy`].
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    /// Add or replace the policy of `category`.
    pub fn with_policy(mut self, category: Category, policy: Policy) -> Result<Self> {
        policy.validate(category)?;
        self.policies.insert(category, policy);
        Ok(self)
    }

    /// The built-in table with overrides keyed by category name applied.
    pub fn from_overrides(overrides: &HashMap<String, PolicyOverride>) -> Result<Self> {
        let mut table = Self::default();
        for (name, o) in overrides {
            let category = Category::from_str(name).map_err(|_| {
                TurnstileError::Config(format!("unknown category in policies: {}", name))
            })?;
            let policy = Policy::from(*o);
            info!(
                category = %category,
                limit = policy.limit,
                window_secs = policy.window.as_secs(),
                "Overriding rate limit policy"
            );
            table = table.with_policy(category, policy)?;
        }
        Ok(table)
    }

    /// Find the policy for a category.
    pub fn get(&self, category: Category) -> Result<Policy> {
        self.policies
            .get(&category)
            .copied()
            .ok_or_else(|| TurnstileError::UnknownCategory(category.to_string()))
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            policies: Category::ALL
                .into_iter()
                .map(|c| (c, c.default_policy()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policies() {
        let table = PolicyTable::default();

        assert_eq!(
            table.get(Category::Login).unwrap(),
            Policy::new(5, Duration::from_secs(900))
        );
        assert_eq!(
            table.get(Category::AdminAction).unwrap(),
            Policy::new(100, Duration::from_secs(60))
        );
        assert_eq!(
            table.get(Category::ApiCall).unwrap(),
            Policy::new(1000, Duration::from_secs(60))
        );
    }

    #[test]
    fn test_parse_category_names() {
        assert_eq!("login".parse::<Category>().unwrap(), Category::Login);
        assert_eq!("ADMIN_ACTION".parse::<Category>().unwrap(), Category::AdminAction);
        assert_eq!("admin-action".parse::<Category>().unwrap(), Category::AdminAction);
        assert_eq!(" api_call ".parse::<Category>().unwrap(), Category::ApiCall);
    }

    #[test]
    fn test_parse_unknown_category() {
        let err = "upload".parse::<Category>().unwrap_err();
        assert!(matches!(err, TurnstileError::UnknownCategory(name) if name == "upload"));
    }

    #[test]
    fn test_missing_policy_is_an_error() {
        let table = PolicyTable::empty()
            .with_policy(Category::Login, Category::Login.default_policy())
            .unwrap();

        assert!(table.get(Category::Login).is_ok());
        assert!(matches!(
            table.get(Category::ApiCall),
            Err(TurnstileError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "login".to_string(),
            PolicyOverride {
                limit: 3,
                window_secs: 600,
            },
        );

        let table = PolicyTable::from_overrides(&overrides).unwrap();
        assert_eq!(
            table.get(Category::Login).unwrap(),
            Policy::new(3, Duration::from_secs(600))
        );
        assert_eq!(table.get(Category::ApiCall).unwrap().limit, 1000);
    }

    #[test]
    fn test_overrides_reject_unknown_and_invalid() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "downloads".to_string(),
            PolicyOverride {
                limit: 3,
                window_secs: 60,
            },
        );
        assert!(matches!(
            PolicyTable::from_overrides(&overrides),
            Err(TurnstileError::Config(_))
        ));

        let mut overrides = HashMap::new();
        overrides.insert(
            "api_call".to_string(),
            PolicyOverride {
                limit: 0,
                window_secs: 60,
            },
        );
        assert!(matches!(
            PolicyTable::from_overrides(&overrides),
            Err(TurnstileError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_window_upper_bound() {
        assert!(Policy::new(5, MAX_WINDOW).validate(Category::Login).is_ok());
        assert!(matches!(
            Policy::new(5, MAX_WINDOW + Duration::from_secs(1)).validate(Category::Login),
            Err(TurnstileError::InvalidPolicy { .. })
        ));

        let mut overrides = HashMap::new();
        overrides.insert(
            "login".to_string(),
            PolicyOverride {
                limit: 5,
                window_secs: u64::MAX,
            },
        );
        assert!(matches!(
            PolicyTable::from_overrides(&overrides),
            Err(TurnstileError::InvalidPolicy { .. })
        ));
    }

    #[test]
    fn test_key_prefixes() {
        assert_eq!(Category::Login.key_prefix(), "login");
        assert_eq!(Category::AdminAction.key_prefix(), "admin-action");
        assert_eq!(Category::ApiCall.key_prefix(), "api");
    }
}
