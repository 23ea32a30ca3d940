//! Attribute validation helpers.
//!
//! Validators never stop at the first problem: each failing attribute adds
//! its own diagnostic, tagged with the attribute path, to a shared
//! [`Diagnostics`] list.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_singularity::diagnostics::Diagnostics;
//! use hemmer_provider_singularity::validation;
//!
//! let mut diags = Diagnostics::new();
//! validation::one_of(&mut diags, "filter", "sort_order", &Some("up".to_string()), validation::SORT_ORDERS);
//! validation::file_mode(&mut diags, "", "file_mode", "0644");
//!
//! let diags = diags.into_vec();
//! assert_eq!(diags.len(), 1);
//! assert_eq!(diags[0].attribute, Some("filter.sort_order".to_string()));
//! ```

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::files;

/// Accepted `sort_order` values.
pub const SORT_ORDERS: &[&str] = &["asc", "desc"];

/// Types whose attributes can be checked before any API call is made.
pub trait Validate {
    /// Append a diagnostic for every invalid attribute. `path` prefixes the
    /// attribute names; pass `""` at the top level.
    fn validate(&self, path: &str, diags: &mut Diagnostics);

    /// Run [`Validate::validate`] at the top level and return what it found.
    fn validation_diagnostics(&self) -> Diagnostics {
        let mut diags = Diagnostics::new();
        self.validate("", &mut diags);
        diags
    }
}

/// Join a parent path and an attribute name.
pub fn attribute_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn invalid_value(parent: &str, name: &str, detail: String) -> Diagnostic {
    Diagnostic::error("Invalid Value Used")
        .with_detail(detail)
        .with_attribute(attribute_path(parent, name))
}

/// Check that an optional string is one of `allowed`. Unset values pass.
pub fn one_of(
    diags: &mut Diagnostics,
    parent: &str,
    name: &str,
    value: &Option<String>,
    allowed: &[&str],
) {
    if let Some(value) = value {
        if !allowed.contains(&value.as_str()) {
            diags.push(invalid_value(
                parent,
                name,
                format!("Value must be one of: {}", allowed.join(", ")),
            ));
        }
    }
}

/// Check that every element of a list is one of `allowed`.
pub fn all_of(
    diags: &mut Diagnostics,
    parent: &str,
    name: &str,
    values: &[String],
    allowed: &[&str],
) {
    let invalid: Vec<&str> = values
        .iter()
        .map(String::as_str)
        .filter(|v| !allowed.contains(v))
        .collect();
    if !invalid.is_empty() {
        diags.push(invalid_value(
            parent,
            name,
            format!(
                "Invalid value(s) {}; each value must be one of: {}",
                invalid.join(", "),
                allowed.join(", ")
            ),
        ));
    }
}

/// Check that a string is a valid octal permission mode.
pub fn file_mode(diags: &mut Diagnostics, parent: &str, name: &str, value: &str) {
    if let Err(e) = files::parse_mode(value) {
        diags.push(invalid_value(parent, name, e.to_string()));
    }
}

/// Check that a required string is not blank.
pub fn not_empty(diags: &mut Diagnostics, parent: &str, name: &str, value: &str) {
    if value.trim().is_empty() {
        diags.push(
            Diagnostic::error("Missing Required Attribute")
                .with_detail(format!("'{}' must not be empty", attribute_path(parent, name)))
                .with_attribute(attribute_path(parent, name)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_path() {
        assert_eq!(attribute_path("", "file_mode"), "file_mode");
        assert_eq!(attribute_path("filter", "sort_by"), "filter.sort_by");
    }

    #[test]
    fn test_one_of() {
        let mut diags = Diagnostics::new();
        one_of(&mut diags, "", "sort_order", &None, SORT_ORDERS);
        one_of(&mut diags, "", "sort_order", &Some("asc".into()), SORT_ORDERS);
        assert!(diags.is_empty());

        one_of(&mut diags, "", "sort_order", &Some("ASC".into()), SORT_ORDERS);
        let diags = diags.into_vec();
        assert_eq!(diags.len(), 1);
        assert!(diags[0].detail.as_deref().unwrap().contains("asc, desc"));
    }

    #[test]
    fn test_all_of_reports_once_per_attribute() {
        let mut diags = Diagnostics::new();
        all_of(
            &mut diags,
            "filter",
            "types",
            &["static".into(), "bogus".into(), "worse".into()],
            &["dynamic", "pinned", "static"],
        );
        let diags = diags.into_vec();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("filter.types"));
        assert!(diags[0].detail.as_deref().unwrap().contains("bogus, worse"));
    }

    #[test]
    fn test_file_mode() {
        let mut diags = Diagnostics::new();
        file_mode(&mut diags, "", "file_mode", "0644");
        file_mode(&mut diags, "", "directory_mode", "755");
        assert!(diags.is_empty());

        file_mode(&mut diags, "", "file_mode", "0999");
        file_mode(&mut diags, "", "directory_mode", "drwxr-xr-x");
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_file_mode_requires_three_plain_digits() {
        let mut diags = Diagnostics::new();
        for mode in ["7", "17", "4755"] {
            file_mode(&mut diags, "", "file_mode", mode);
        }
        assert_eq!(diags.len(), 3);
        assert!(diags.into_vec()[2]
            .detail
            .as_deref()
            .unwrap()
            .contains("0644"));
    }

    #[test]
    fn test_not_empty() {
        let mut diags = Diagnostics::new();
        not_empty(&mut diags, "", "package_id", "p-1");
        assert!(diags.is_empty());
        not_empty(&mut diags, "", "package_id", "  ");
        assert_eq!(diags.into_vec()[0].attribute.as_deref(), Some("package_id"));
    }
}
