// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides catalog fixtures, the shipped catalog path and render engine setup

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use cntr::catalog::{Catalog, MANIFEST_FILE};
use cntr::engine::RenderEngine;
use cntr::template::{Builtins, DryRunPathOps, HostPathOps, PathOps, VariableResolver};

pub const TEST_UID: u32 = 1000;
pub const TEST_GID: u32 = 100;

/// The catalog shipped with the crate.
pub fn shipped_catalog_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("catalog")
}

pub struct TestService {
    pub name: String,
    pub order: i64,
    pub dependencies: Vec<String>,
    pub variables: Vec<(String, String)>,
    pub template: String,
    pub assets: Vec<(String, String)>,
}

impl TestService {
    pub fn new(name: &str, template: &str) -> Self {
        Self {
            name: name.to_string(),
            order: 100,
            dependencies: Vec::new(),
            variables: Vec::new(),
            template: template.to_string(),
            assets: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// `spec` is the inline YAML mapping for the variable, e.g. `{ default: 1 }`.
    pub fn with_variable(mut self, name: &str, spec: &str) -> Self {
        self.variables.push((name.to_string(), spec.to_string()));
        self
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.dependencies.push(name.to_string());
        self
    }

    pub fn with_asset(mut self, path: &str, contents: &str) -> Self {
        self.assets.push((path.to_string(), contents.to_string()));
        self
    }

    fn manifest(&self) -> String {
        let mut yaml = format!("description: \"Test service {}\"\norder: {}\n", self.name, self.order);

        if !self.dependencies.is_empty() {
            yaml.push_str(&format!("dependencies: [{}]\n", self.dependencies.join(", ")));
        }

        if !self.variables.is_empty() {
            yaml.push_str("variables:\n");
            for (name, spec) in &self.variables {
                yaml.push_str(&format!("  {}: {}\n", name, spec));
            }
        }

        yaml
    }

    fn write(&self, root: &Path) {
        let dir = root.join(&self.name);
        std::fs::create_dir_all(&dir).expect("Failed to create service directory");
        std::fs::write(dir.join(MANIFEST_FILE), self.manifest()).expect("Failed to write manifest");
        std::fs::write(dir.join("compose.yml"), &self.template).expect("Failed to write template");
        for (path, contents) in &self.assets {
            let target = dir.join(path);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create asset directory");
            }
            std::fs::write(target, contents).expect("Failed to write asset");
        }
    }
}

pub struct TestEnvironment {
    pub temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.path().join("catalog")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("output")
    }

    pub fn install_path(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn config_file(&self) -> PathBuf {
        self.path().join("cntr.yaml")
    }

    pub fn add_service(&self, service: TestService) -> &Self {
        service.write(&self.catalog_dir());
        self
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::new(Catalog::load(self.catalog_dir()).expect("Failed to load test catalog"))
    }

    /// Engine over this environment's catalog creating real directories.
    pub fn host_engine(&self) -> RenderEngine {
        engine(self.catalog(), self.install_path(), Arc::new(HostPathOps))
    }

    /// Engine over this environment's catalog that never touches the disk.
    pub fn dry_run_engine(&self) -> RenderEngine {
        engine(
            self.catalog(),
            self.install_path(),
            Arc::new(DryRunPathOps::new(TEST_UID, TEST_GID)),
        )
    }
}

pub fn engine(catalog: Arc<Catalog>, install_path: PathBuf, path_ops: Arc<dyn PathOps>) -> RenderEngine {
    RenderEngine::new(
        catalog,
        VariableResolver::new(Builtins::new(TEST_UID, TEST_GID, install_path)),
        path_ops,
    )
}

pub fn overrides(pairs: &[(&str, &str)]) -> indexmap::IndexMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_manifest() {
        let service = TestService::new("web", "services: {}\n")
            .with_order(5)
            .depends_on("db")
            .with_variable("WEB_PORT", "{ default: 80 }");

        let manifest = service.manifest();
        assert!(manifest.contains("order: 5"));
        assert!(manifest.contains("dependencies: [db]"));
        assert!(manifest.contains("  WEB_PORT: { default: 80 }"));
    }

    #[test]
    fn test_environment_setup() {
        let env = TestEnvironment::new();
        env.add_service(TestService::new("web", "services: {}\n").with_asset("conf/a.conf", "a"));

        let catalog = env.catalog();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("web").unwrap().assets.len(), 1);
    }
}
