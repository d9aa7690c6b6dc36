use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One persisted entry in a document's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub document_id: Uuid,
    /// Starts at 1 and increases by exactly one per version.
    pub version_number: u32,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    /// Canonical body used for diffing; older stores may lack it.
    #[serde(default)]
    pub rendered_body: Option<String>,
}

impl DocumentVersion {
    /// The first version of a newly seen document, with a fresh id.
    pub fn first(hash: impl Into<String>, rendered_body: impl Into<String>) -> Self {
        Self {
            document_id: Uuid::new_v4(),
            version_number: 1,
            hash: hash.into(),
            created_at: Utc::now(),
            rendered_body: Some(rendered_body.into()),
        }
    }

    /// The version that follows `self`, keeping its document id.
    pub fn next(&self, hash: impl Into<String>, rendered_body: impl Into<String>) -> Self {
        Self {
            document_id: self.document_id,
            version_number: self.version_number + 1,
            hash: hash.into(),
            created_at: Utc::now(),
            rendered_body: Some(rendered_body.into()),
        }
    }

    pub fn label(&self) -> String {
        format!("v{}", self.version_number)
    }
}

/// What a reconcile did to a document's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "version", rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Unchanged,
    Updated(u32),
}

impl Outcome {
    /// Whether a new version was written.
    pub fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created v1"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Updated(n) => write!(f, "updated to v{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn next_keeps_id_and_increments() {
        let v1 = DocumentVersion::first("aaa", "body");
        let v2 = v1.next("bbb", "body 2");

        assert_eq!(v1.version_number, 1);
        assert_eq!(v2.version_number, 2);
        assert_eq!(v2.document_id, v1.document_id);
        assert_eq!(v2.label(), "v2");
    }

    #[test]
    fn missing_snapshot_deserializes_as_none() {
        let v: DocumentVersion = serde_json::from_value(json!({
            "document_id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "version_number": 3,
            "hash": "abc",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(v.rendered_body, None);
    }

    #[test]
    fn outcome_serializes_with_version() {
        assert_eq!(
            serde_json::to_value(Outcome::Updated(4)).unwrap(),
            json!({"outcome": "updated", "version": 4})
        );
        assert_eq!(
            serde_json::to_value(Outcome::Created).unwrap(),
            json!({"outcome": "created"})
        );
        assert!(!Outcome::Unchanged.is_change());
    }
}
