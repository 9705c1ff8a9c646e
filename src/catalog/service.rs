// ABOUTME: Service definitions loaded from catalog directories
// ABOUTME: Parses service.yaml manifests and discovers the template and static assets

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::error::{CatalogError, Result};
use crate::template::{Value, ValueKind};

pub const MANIFEST_FILE: &str = "service.yaml";
pub const DEFAULT_TEMPLATE: &str = "compose.yml";

fn default_template() -> String {
    DEFAULT_TEMPLATE.to_string()
}

fn default_order() -> i64 {
    1000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceManifest {
    description: Option<String>,
    #[serde(default = "default_order")]
    order: i64,
    #[serde(default = "default_template")]
    template: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    variables: IndexMap<String, VariableDecl>,
}

/// One variable a service declares. Without a default it is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct VariableDecl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValueKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VariableDecl {
    pub fn with_default(default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
            ..Self::default()
        }
    }

    pub fn required(kind: ValueKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Explicit kind, else the kind of the default, else string.
    pub fn kind(&self) -> ValueKind {
        self.kind
            .or_else(|| self.default.as_ref().map(Value::kind))
            .unwrap_or(ValueKind::String)
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Bring the default in line with an explicit kind.
    fn normalize(&mut self) -> std::result::Result<(), String> {
        let (Some(kind), Some(default)) = (self.kind, self.default.as_ref()) else {
            return Ok(());
        };
        if default.kind() == kind {
            return Ok(());
        }
        let raw = default.to_string();
        let value = Value::parse_as(kind, &raw)
            .ok_or_else(|| format!("default '{}' is not {}", raw, kind.describe()))?;
        self.default = Some(value);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub root: PathBuf,
    pub template: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub order: i64,
    pub dependencies: Vec<String>,
    pub variables: IndexMap<String, VariableDecl>,
    /// Paths relative to `root`, copied verbatim next to the rendered file.
    pub assets: Vec<PathBuf>,
}

impl ServiceDefinition {
    /// An empty definition rooted at `root` with the default template name.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            name: name.into(),
            template: root.join(DEFAULT_TEMPLATE),
            root,
            description: None,
            order: default_order(),
            dependencies: Vec::new(),
            variables: IndexMap::new(),
            assets: Vec::new(),
        }
    }

    /// Load the service whose manifest lives in `dir`. The directory name is
    /// the service name.
    pub fn load(dir: &Path) -> Result<Self> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CatalogError::Io {
                path: dir.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "service directory name is not valid UTF-8",
                ),
            })?
            .to_string();

        let manifest_path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&manifest_path).map_err(|source| CatalogError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let mut manifest: ServiceManifest =
            serde_yaml::from_str(&content).map_err(|source| CatalogError::InvalidManifest {
                path: manifest_path,
                source,
            })?;

        for (variable, decl) in manifest.variables.iter_mut() {
            decl.normalize().map_err(|reason| CatalogError::InvalidVariable {
                service: name.clone(),
                variable: variable.clone(),
                reason,
            })?;
        }

        let template = dir.join(&manifest.template);
        if !template.is_file() {
            return Err(CatalogError::MissingTemplate {
                service: name,
                path: template,
            });
        }

        let assets = discover_assets(dir, &template)?;

        Ok(Self {
            name,
            root: dir.to_path_buf(),
            template,
            description: manifest.description,
            order: manifest.order,
            dependencies: manifest.dependencies,
            variables: manifest.variables,
            assets,
        })
    }

    pub fn read_template(&self) -> Result<String> {
        std::fs::read_to_string(&self.template).map_err(|source| CatalogError::Io {
            path: self.template.clone(),
            source,
        })
    }

    /// File name the rendered document is written under.
    pub fn output_file_name(&self) -> &std::ffi::OsStr {
        self.template
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new(DEFAULT_TEMPLATE))
    }
}

/// Every regular, non-hidden file under `dir` except the manifest and the template.
fn discover_assets(dir: &Path, template: &Path) -> Result<Vec<PathBuf>> {
    let manifest = dir.join(MANIFEST_FILE);
    let mut assets = Vec::new();

    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path == manifest || path == template {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(dir) {
            assets.push(relative.to_path_buf());
        }
    }

    Ok(assets)
}
