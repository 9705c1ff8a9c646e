// ABOUTME: The render pipeline: catalog lookup, variable resolution, rendering and emission
// ABOUTME: Each render is independent, so one engine can serve many services concurrently

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::Result;
use super::result::RenderedArtifact;
use crate::catalog::{Catalog, ServiceDefinition};
use crate::output::{ArtifactWriter, WrittenArtifact};
use crate::template::{PathOps, TemplateEngine, TemplateError, Value, VariableResolver};

#[derive(Clone)]
pub struct RenderEngine {
    catalog: Arc<Catalog>,
    resolver: VariableResolver,
    templates: TemplateEngine,
    environment: HashMap<String, String>,
}

impl RenderEngine {
    pub fn new(catalog: Arc<Catalog>, resolver: VariableResolver, path_ops: Arc<dyn PathOps>) -> Self {
        Self {
            catalog,
            resolver,
            templates: TemplateEngine::new(path_ops),
            environment: HashMap::new(),
        }
    }

    /// Snapshot of environment variables consulted during resolution.
    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &VariableResolver {
        &self.resolver
    }

    /// Services to render for `names`, with their dependencies when asked,
    /// dependencies first.
    pub fn plan(&self, names: &[String], with_dependencies: bool) -> Result<Vec<&ServiceDefinition>> {
        if with_dependencies {
            return Ok(self.catalog.resolve_dependencies(names)?);
        }
        let mut services = Vec::with_capacity(names.len());
        for name in names {
            let service = self.catalog.get(name)?;
            if !services.iter().any(|s: &&ServiceDefinition| s.name == service.name) {
                services.push(service);
            }
        }
        Ok(services)
    }

    /// Reject override keys that none of `services` recognizes.
    pub fn check_overrides(
        &self,
        services: &[&ServiceDefinition],
        overrides: &IndexMap<String, String>,
    ) -> Result<()> {
        for key in overrides.keys() {
            let recognized = services
                .iter()
                .any(|service| VariableResolver::recognized(service).contains(&key.as_str()));
            if !recognized {
                let mut known: Vec<String> = services
                    .iter()
                    .flat_map(|service| VariableResolver::recognized(service))
                    .map(str::to_string)
                    .collect();
                known.sort();
                known.dedup();
                return Err(TemplateError::UnknownVariable {
                    variable: key.clone(),
                    service: services
                        .iter()
                        .map(|s| s.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    known,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Merge override layers, later layers winning, keeping only the names
    /// `service` recognizes.
    pub fn scoped_overrides(
        service: &ServiceDefinition,
        layers: &[&IndexMap<String, String>],
    ) -> IndexMap<String, String> {
        let recognized = VariableResolver::recognized(service);
        let mut merged = IndexMap::new();
        for layer in layers {
            for (key, value) in layer.iter() {
                if recognized.contains(&key.as_str()) {
                    merged.insert(key.clone(), value.clone());
                } else {
                    debug!("{} does not use {}, skipping", service.name, key);
                }
            }
        }
        merged
    }

    /// Effective value of each variable `name` declares, without requiring
    /// that every required one is set.
    pub fn effective(
        &self,
        name: &str,
        overrides: &IndexMap<String, String>,
    ) -> Result<IndexMap<String, Option<Value>>> {
        let service = self.catalog.get(name)?;
        Ok(self.resolver.effective(service, &self.environment, overrides)?)
    }

    /// Render one service without writing anything.
    pub fn render(&self, name: &str, overrides: &IndexMap<String, String>) -> Result<RenderedArtifact> {
        let service = self.catalog.get(name)?;
        let variables = self.resolver.resolve(service, &self.environment, overrides)?;
        let template = service.read_template()?;

        debug!(
            "Rendering {} from {} with {} variables",
            service.name,
            service.template.display(),
            variables.len()
        );
        let document = self.templates.render(&service.name, &template, &variables)?;

        Ok(RenderedArtifact {
            service: service.name.clone(),
            file_name: PathBuf::from(service.output_file_name()),
            document,
            source_root: service.root.clone(),
            assets: service.assets.clone(),
        })
    }

    /// Render one service and write it under `out_dir/<service>/`.
    ///
    /// A document that does not parse as YAML is never written.
    pub fn render_to(
        &self,
        name: &str,
        overrides: &IndexMap<String, String>,
        out_dir: &Path,
    ) -> Result<WrittenArtifact> {
        let artifact = self.render(name, overrides)?;
        artifact.validate_yaml()?;
        let written = ArtifactWriter::new(out_dir).write(&artifact)?;
        info!("Service {} written to {}", name, written.document.display());
        Ok(written)
    }
}
