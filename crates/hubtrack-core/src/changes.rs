//! Parsing of the changes annotation
//!
//! The annotation accepts either a list of plain descriptions:
//!
//! ```yaml
//! - Added cool feature
//! - Fixed minor bug
//! ```
//!
//! or a list of structured entries with a kind and optional links.

use crate::error::{CoreError, Result};
use crate::package::Change;

/// Kinds a structured change entry may use
pub const VALID_CHANGE_KINDS: &[&str] =
    &["added", "changed", "deprecated", "removed", "fixed", "security"];

/// Parse and validate a changes annotation value
pub fn parse_changes_annotation(annotation: &str) -> Result<Vec<Change>> {
    if let Ok(descriptions) = serde_yaml::from_str::<Vec<String>>(annotation) {
        return Ok(descriptions
            .into_iter()
            .map(|description| Change {
                description,
                ..Default::default()
            })
            .collect());
    }

    let mut changes: Vec<Change> =
        serde_yaml::from_str(annotation).map_err(|_| CoreError::InvalidChangesAnnotation {
            annotation: annotation.to_string(),
        })?;

    let mut problems = Vec::new();
    for change in &mut changes {
        if !change.kind.is_empty() {
            change.kind = change.kind.to_lowercase();
            if !VALID_CHANGE_KINDS.contains(&change.kind.as_str()) {
                problems.push(format!("invalid change: invalid kind: {}", change.kind));
            }
        }
        if change.description.is_empty() {
            problems.push("invalid change: description not provided".to_string());
        }
        for link in &change.links {
            if link.name.is_empty() {
                problems.push("invalid change: link name not provided".to_string());
            }
            if link.url.is_empty() {
                problems.push("invalid change: link url not provided".to_string());
            }
        }
    }

    if problems.is_empty() {
        Ok(changes)
    } else {
        Err(CoreError::InvalidChanges(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Link;

    #[test]
    fn test_descriptions_list() {
        let changes =
            parse_changes_annotation("- Added cool feature\n- Fixed minor bug\n").unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].description, "Added cool feature");
        assert!(changes[0].kind.is_empty());
    }

    #[test]
    fn test_structured_list() {
        let changes = parse_changes_annotation(
            r#"
- kind: Added
  description: Cool feature
  links:
    - name: GitHub Issue
      url: https://github.com/issue-url
- kind: fixed
  description: Minor bug
"#,
        )
        .unwrap();

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].kind, "added");
        assert_eq!(
            changes[0].links,
            vec![Link::new("GitHub Issue", "https://github.com/issue-url")]
        );
        assert_eq!(changes[1].kind, "fixed");
    }

    #[test]
    fn test_invalid_entries_accumulate() {
        let err = parse_changes_annotation(
            r#"
- kind: improved
  description: Something
- kind: added
- description: Link without url
  links:
    - name: issue
"#,
        )
        .unwrap_err()
        .to_string();

        assert!(err.contains("invalid kind: improved"));
        assert!(err.contains("description not provided"));
        assert!(err.contains("link url not provided"));
    }

    #[test]
    fn test_unparseable() {
        let err = parse_changes_annotation("- key: [unclosed").unwrap_err();
        assert!(err.to_string().contains("Please use quotes on strings"));
    }
}
