//! Identifiers for local content and remote records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable id of a content item inside the local project (e.g. a GUID).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A project inside an organization on the remote repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub organization_id: String,
    pub project_id: String,
}

impl ProjectRef {
    pub fn new(organization_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Returns `true` if either half of the reference is missing.
    pub fn is_empty(&self) -> bool {
        self.organization_id.is_empty() || self.project_id.is_empty()
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization_id, self.project_id)
    }
}

/// Identity of a specific version of a record on the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetIdentifier {
    pub organization_id: String,
    pub project_id: String,
    pub asset_id: String,
    pub version: String,
}

impl AssetIdentifier {
    pub fn new(project: &ProjectRef, asset_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            organization_id: project.organization_id.clone(),
            project_id: project.project_id.clone(),
            asset_id: asset_id.into(),
            version: version.into(),
        }
    }

    /// The project this record lives in.
    pub fn project(&self) -> ProjectRef {
        ProjectRef::new(&self.organization_id, &self.project_id)
    }

    /// Returns `true` if both identifiers name the same record, regardless of version.
    pub fn same_asset(&self, other: &AssetIdentifier) -> bool {
        self.organization_id == other.organization_id
            && self.project_id == other.project_id
            && self.asset_id == other.asset_id
    }

    /// Returns a copy pointing at another version of the same record.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for AssetIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}",
            self.organization_id, self.project_id, self.asset_id, self.version
        )
    }
}

/// Identity of a staged asset: either still local (no remote id yet)
/// or an existing remote record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentIdentifier {
    Local {
        project: ProjectRef,
        content_id: ContentId,
    },
    Remote(AssetIdentifier),
}

impl ContentIdentifier {
    pub fn local(project: &ProjectRef, content_id: &ContentId) -> Self {
        Self::Local {
            project: project.clone(),
            content_id: content_id.clone(),
        }
    }

    /// The local content id, if this identifier is still pending.
    pub fn content_id(&self) -> Option<&ContentId> {
        match self {
            Self::Local { content_id, .. } => Some(content_id),
            Self::Remote(_) => None,
        }
    }

    pub fn remote(&self) -> Option<&AssetIdentifier> {
        match self {
            Self::Local { .. } => None,
            Self::Remote(id) => Some(id),
        }
    }
}

impl fmt::Display for ContentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { project, content_id } => write!(f, "local:{project}/{content_id}"),
            Self::Remote(id) => write!(f, "{id}"),
        }
    }
}
