//! Naming conventions linking route targets, container keys, type names and source paths.
//!
//! Every function here is pure: the mapping from `to: "users.index"` to the key
//! `actions.users.index`, the type `admin::actions::users::Index` and the file
//! `slices/admin/actions/users/index.rs` never inspects loaded code.

use std::collections::HashMap;
use std::fmt;

/// Container namespace for actions.
pub const ACTIONS_NAMESPACE: &str = "actions";

/// Slice names: lowercase ASCII, digits and underscores, starting with a letter.
pub fn is_valid_slice_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Why a route target could not be turned into an action key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTarget {
    pub target: String,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid action target \"{}\": {}", self.target, self.reason)
    }
}

impl std::error::Error for InvalidTarget {}

/// The dotted identifier derived from a route's `to:` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    segments: Vec<String>,
}

impl ActionKey {
    /// Parse a target such as `"users.index"` or `"admin.reports.show"`.
    pub fn parse(target: &str) -> Result<Self, InvalidTarget> {
        let invalid = |reason| InvalidTarget {
            target: target.to_string(),
            reason,
        };

        if target.trim().is_empty() {
            return Err(invalid("target is empty"));
        }
        let segments: Vec<String> = target.split('.').map(String::from).collect();
        if segments.len() < 2 {
            return Err(invalid("expected at least <resource>.<action>"));
        }
        if !segments.iter().all(|s| is_valid_segment(s)) {
            return Err(invalid("segments must be lowercase identifiers"));
        }
        Ok(Self { segments })
    }

    /// The container key, e.g. `actions.users.index`.
    pub fn container_key(&self) -> String {
        format!("{}.{}", ACTIONS_NAMESPACE, self.segments.join("."))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.container_key())
    }
}

/// Word inflections used to derive type names.
///
/// Registered in every application container under `inflector`.
#[derive(Debug, Clone, Default)]
pub struct Inflector {
    acronyms: HashMap<String, String>,
}

impl Inflector {
    /// Treat `word` as an acronym: `with_acronym("API")` camelizes `api` to `API`.
    pub fn with_acronym(mut self, word: &str) -> Self {
        self.acronyms.insert(word.to_ascii_lowercase(), word.to_string());
        self
    }

    /// `user_profile` → `UserProfile`.
    pub fn camelize(&self, word: &str) -> String {
        word.split('_')
            .filter(|part| !part.is_empty())
            .map(|part| match self.acronyms.get(part) {
                Some(acronym) => acronym.clone(),
                None => {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                        None => String::new(),
                    }
                }
            })
            .collect()
    }
}

/// Where a slice's code lives and how its types are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceLayout {
    /// Module path of the slice, e.g. `bookshelf` or `admin::reports`.
    pub namespace: String,
    /// Source directory relative to the app root, e.g. `app` or `slices/admin`.
    pub source_dir: String,
}

impl SliceLayout {
    /// Layout of the application itself.
    pub fn application(app_name: &str, app_dir: &str) -> Self {
        Self {
            namespace: app_name.to_string(),
            source_dir: app_dir.trim_end_matches('/').to_string(),
        }
    }

    /// Layout of a top-level slice.
    pub fn top_level(name: &str, slices_dir: &str) -> Self {
        Self {
            namespace: name.to_string(),
            source_dir: format!("{}/{}", slices_dir.trim_end_matches('/'), name),
        }
    }

    /// Layout of a slice nested inside `self`.
    pub fn nested(&self, name: &str, slices_dir: &str) -> Self {
        Self {
            namespace: format!("{}::{}", self.namespace, name),
            source_dir: format!(
                "{}/{}/{}",
                self.source_dir,
                slices_dir.trim_end_matches('/'),
                name
            ),
        }
    }

    /// Fully-qualified type an action key expects, e.g. `admin::actions::users::Index`.
    pub fn action_type_name(&self, key: &ActionKey, inflector: &Inflector) -> String {
        let mut parts = vec![self.namespace.clone(), ACTIONS_NAMESPACE.to_string()];
        if let Some((last, modules)) = key.segments().split_last() {
            parts.extend(modules.iter().cloned());
            parts.push(inflector.camelize(last));
        }
        parts.join("::")
    }

    /// Conventional source file for an action key, e.g. `slices/admin/actions/users/index.rs`.
    pub fn action_source_path(&self, key: &ActionKey) -> String {
        format!(
            "{}/{}/{}.rs",
            self.source_dir,
            ACTIONS_NAMESPACE,
            key.segments().join("/")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_names() {
        assert!(is_valid_slice_name("admin"));
        assert!(is_valid_slice_name("api_v2"));
        assert!(!is_valid_slice_name(""));
        assert!(!is_valid_slice_name("Admin"));
        assert!(!is_valid_slice_name("2fa"));
        assert!(!is_valid_slice_name("back-office"));
    }

    #[test]
    fn test_action_key_from_target() {
        let key = ActionKey::parse("users.index").unwrap();
        assert_eq!(key.container_key(), "actions.users.index");

        let nested = ActionKey::parse("admin.reports.show").unwrap();
        assert_eq!(nested.container_key(), "actions.admin.reports.show");
    }

    #[test]
    fn test_action_key_rejects_malformed() {
        assert!(ActionKey::parse("").is_err());
        assert!(ActionKey::parse("index").is_err());
        assert!(ActionKey::parse("users..index").is_err());
        assert!(ActionKey::parse("Users.Index").is_err());
    }

    #[test]
    fn test_application_type_and_path() {
        let layout = SliceLayout::application("bookshelf", "app");
        let key = ActionKey::parse("users.index").unwrap();
        let inflector = Inflector::default();

        assert_eq!(
            layout.action_type_name(&key, &inflector),
            "bookshelf::actions::users::Index"
        );
        assert_eq!(layout.action_source_path(&key), "app/actions/users/index.rs");
    }

    #[test]
    fn test_nested_slice_type_and_path() {
        let admin = SliceLayout::top_level("admin", "slices");
        let reports = admin.nested("reports", "slices");
        let key = ActionKey::parse("monthly_totals.show").unwrap();
        let inflector = Inflector::default();

        assert_eq!(
            reports.action_type_name(&key, &inflector),
            "admin::reports::actions::monthly_totals::Show"
        );
        assert_eq!(
            reports.action_source_path(&key),
            "slices/admin/slices/reports/actions/monthly_totals/show.rs"
        );
    }

    #[test]
    fn test_inflector() {
        let inflector = Inflector::default().with_acronym("API");
        assert_eq!(inflector.camelize("user_profile"), "UserProfile");
        assert_eq!(inflector.camelize("api_keys"), "APIKeys");
    }
}
