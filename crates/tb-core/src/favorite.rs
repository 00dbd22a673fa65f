//! Saved templates for quickly creating time entries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{FavoriteId, ProjectId, ValidationError};

/// A reusable entry template owned by a project.
///
/// The description may contain `{{name}}` placeholders resolved at
/// instantiation time from caller-supplied values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: FavoriteId,
    pub project_id: ProjectId,
    /// Unique per project.
    pub name: String,
    pub description_template: String,
    pub default_billable: bool,
}

impl Favorite {
    pub fn new(
        id: FavoriteId,
        project_id: ProjectId,
        name: impl Into<String>,
        description_template: impl Into<String>,
        default_billable: bool,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::Empty {
                field: "favorite name",
            });
        }
        Ok(Self {
            id,
            project_id,
            name,
            description_template: description_template.into(),
            default_billable,
        })
    }

    /// Renders the description template against `values`.
    pub fn render(&self, values: &HashMap<String, String>) -> Result<String, ValidationError> {
        render_template(&self.description_template, values)
    }
}

/// Substitutes `{{name}}` placeholders in `template` from `values`.
///
/// Every placeholder must have a value; an unmatched `{{` with no closing
/// marker is kept as literal text.
pub fn render_template(
    template: &str,
    values: &HashMap<String, String>,
) -> Result<String, ValidationError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = after[..close].trim();
        match values.get(name) {
            Some(value) => out.push_str(value),
            None => {
                return Err(ValidationError::UnresolvedPlaceholder {
                    name: name.to_string(),
                });
            }
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn renders_placeholders() {
        let rendered = render_template("Fix bug #{{id}}", &values(&[("id", "12")])).unwrap();
        assert_eq!(rendered, "Fix bug #12");
    }

    #[test]
    fn renders_multiple_placeholders() {
        let rendered = render_template(
            "{{kind}} for {{client}}",
            &values(&[("kind", "CRM sync"), ("client", "Oleg")]),
        )
        .unwrap();
        assert_eq!(rendered, "CRM sync for Oleg");
    }

    #[test]
    fn template_without_placeholders_is_verbatim() {
        let rendered = render_template("Infra maintenance", &values(&[])).unwrap();
        assert_eq!(rendered, "Infra maintenance");
    }

    #[test]
    fn unresolved_placeholder_fails() {
        let err = render_template("Fix bug #{{id}}", &values(&[])).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnresolvedPlaceholder {
                name: "id".to_string()
            }
        );
    }

    #[test]
    fn unclosed_marker_is_literal() {
        let rendered = render_template("stuck {{ here", &values(&[])).unwrap();
        assert_eq!(rendered, "stuck {{ here");
    }

    #[test]
    fn favorite_renders_its_template() {
        let favorite = Favorite::new(
            FavoriteId::generate(),
            ProjectId::generate(),
            "Bugfix quickstart",
            "Fix bug #{{id}}",
            true,
        )
        .unwrap();
        assert_eq!(
            favorite.render(&values(&[("id", "42")])).unwrap(),
            "Fix bug #42"
        );
    }
}
