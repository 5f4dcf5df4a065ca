//! # Resource Catalog
//!
//! The static set of protected resources and the actions each one exposes,
//! derived from an action catalog. Loaded once; reloading is explicit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{AclError, AclResult};
use crate::ids::{ActionId, ResourceId};
use crate::store::{CatalogSection, CatalogSource};

/// A protected resource and its ordered actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Resource id
    pub id: ResourceId,
    /// Actions in declaration order
    pub actions: Vec<ActionId>,
}

impl Resource {
    /// Check if the resource declares an action.
    pub fn has_action(&self, action: &ActionId) -> bool {
        self.actions.contains(action)
    }
}

/// Ordered collection of resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl ResourceCatalog {
    /// Load the catalog from a source.
    ///
    /// # Errors
    ///
    /// [`AclError::CatalogLoad`] if the source fails or declares a section
    /// or action without a name, a section twice, or an action twice within
    /// the same section.
    pub async fn load(source: &dyn CatalogSource) -> AclResult<Self> {
        let sections = source.list_resources().await?;
        Self::from_sections(sections, &source.name())
    }

    /// Build the catalog from already-loaded sections.
    pub fn from_sections(sections: Vec<CatalogSection>, source_name: &str) -> AclResult<Self> {
        let invalid = |message: String| AclError::CatalogLoad {
            source_name: source_name.to_string(),
            message,
        };

        let mut resources = Vec::with_capacity(sections.len());
        let mut index = HashMap::with_capacity(sections.len());

        for section in sections {
            if section.name.as_str().is_empty() {
                return Err(invalid("section without a name".to_string()));
            }
            if index.contains_key(&section.name) {
                return Err(invalid(format!("section `{}` declared twice", section.name)));
            }

            let mut seen = HashSet::new();
            let mut actions = Vec::with_capacity(section.actions.len());
            for action in section.actions {
                if action.name.as_str().is_empty() {
                    return Err(invalid(format!(
                        "action without a name in section `{}`",
                        section.name
                    )));
                }
                if !seen.insert(action.name.clone()) {
                    return Err(invalid(format!(
                        "action `{}` declared twice in section `{}`",
                        action.name, section.name
                    )));
                }
                actions.push(action.name);
            }

            index.insert(section.name.clone(), resources.len());
            resources.push(Resource {
                id: section.name,
                actions,
            });
        }

        Ok(Self { resources, index })
    }

    /// Get a resource by id.
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|idx| &self.resources[*idx])
    }

    /// Check if a resource declares an action.
    pub fn declares(&self, resource: &ResourceId, action: &ActionId) -> bool {
        self.get(resource).is_some_and(|r| r.has_action(action))
    }

    /// All resources, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// Number of resources.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// JSON document form of the action catalog.
///
/// ```json
/// {"sections": [{"name": "blog", "actions": [{"name": "view"}, {"name": "publish"}]}]}
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Sections in declaration order
    pub sections: Vec<CatalogSection>,
}

#[derive(Debug, Clone)]
enum JsonOrigin {
    Inline(String),
    File(PathBuf),
}

/// Catalog source backed by a JSON document, inline or on disk.
///
/// A file is read every time the catalog is loaded, so a missing file is
/// reported when the engine builds its tables.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    origin: JsonOrigin,
}

impl JsonCatalog {
    /// Catalog from an in-memory JSON string.
    pub fn from_json(json: impl Into<String>) -> Self {
        Self {
            origin: JsonOrigin::Inline(json.into()),
        }
    }

    /// Catalog read from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self {
            origin: JsonOrigin::File(path.as_ref().to_path_buf()),
        }
    }

    /// Parse a catalog document.
    pub fn parse(json: &str, source_name: &str) -> AclResult<CatalogDocument> {
        serde_json::from_str(json).map_err(|e| AclError::CatalogLoad {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl CatalogSource for JsonCatalog {
    fn name(&self) -> String {
        match &self.origin {
            JsonOrigin::Inline(_) => "inline JSON".to_string(),
            JsonOrigin::File(path) => path.display().to_string(),
        }
    }

    async fn list_resources(&self) -> AclResult<Vec<CatalogSection>> {
        let source_name = self.name();
        let contents = match &self.origin {
            JsonOrigin::Inline(json) => json.clone(),
            JsonOrigin::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| AclError::CatalogLoad {
                        source_name: source_name.clone(),
                        message: e.to_string(),
                    })?
            }
        };

        Ok(Self::parse(&contents, &source_name)?.sections)
    }
}
