// ABOUTME: Command implementations for the cntr CLI
// ABOUTME: Handles list, info, render, check and config commands

use anyhow::{Context, Result};
use futures::future::join_all;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::args::Args;
use super::config::Config;
use crate::catalog::Catalog;
use crate::engine::{EngineError, RenderEngine, RenderedArtifact};
use crate::output::{ArtifactWriter, WrittenArtifact};
use crate::template::{Builtins, DryRunPathOps, HostPathOps, PathOps, TemplateError, VariableResolver};

/// What a render command produced for one service.
#[derive(Debug, Clone)]
pub enum Rendered {
    Written(WrittenArtifact),
    Preview(RenderedArtifact),
}

/// Outcome of `check` across the whole catalog.
#[derive(Debug, Default, Clone)]
pub struct CheckReport {
    pub passed: Vec<String>,
    /// Services that need a value nobody has provided yet.
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

impl CheckReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load the catalog named by the configuration
pub fn load_catalog(config: &Config) -> Result<Arc<Catalog>> {
    let catalog = Catalog::load(&config.catalog_dir)
        .with_context(|| format!("Failed to load catalog from {}", config.catalog_dir.display()))?;
    Ok(Arc::new(catalog))
}

fn build_engine(config: &Config, catalog: Arc<Catalog>, dry_run: bool) -> RenderEngine {
    let builtins = Builtins::detect(config.install_path());
    let path_ops: Arc<dyn PathOps> = if dry_run {
        Arc::new(DryRunPathOps::new(builtins.uid, builtins.gid))
    } else {
        Arc::new(HostPathOps)
    };
    let environment: HashMap<String, String> = std::env::vars().collect();
    RenderEngine::new(catalog, VariableResolver::new(builtins), path_ops).with_environment(environment)
}

/// Installed services the catalog knows, warning about the rest.
fn installed_names(config: &Config, catalog: &Catalog) -> Vec<String> {
    config
        .installed
        .iter()
        .filter(|name| {
            let known = catalog.get(name).is_ok();
            if !known {
                warn!("Installed service {} is not in {}", name, catalog.root().display());
            }
            known
        })
        .cloned()
        .collect()
}

/// Print the catalog ordered for display, marking installed services and
/// the dependencies they pull in
pub async fn list_services(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    let installed = installed_names(config, &catalog);
    let required: Vec<String> = catalog
        .resolve_dependencies(&installed)?
        .iter()
        .map(|service| service.name.clone())
        .collect();

    for service in catalog.list() {
        if installed.contains(&service.name) {
            println!("[*] {} [added]", service.name);
        } else if required.contains(&service.name) {
            println!("[-] {} [dependency]", service.name);
        } else {
            println!("[ ] {}", service.name);
        }
    }
    info!("{} services in {}", catalog.len(), catalog.root().display());
    Ok(())
}

/// Add services to the persisted installed set
pub async fn add_services(names: Vec<String>, config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    for name in &names {
        catalog.get(name)?;
    }

    let mut stored = Config::read(Some(config.path.clone()))?;
    let mut added = stored.add_installed(&names);
    if added.is_empty() {
        return Err(anyhow::anyhow!("No service added: {} already installed", names.join(", ")));
    }
    stored.save()?;

    added.sort();
    println!("Add {} success", added.join(", "));
    Ok(())
}

/// Remove services from the persisted installed set. Without `force`, a
/// service another remaining installed service depends on is kept.
pub async fn remove_services(names: Vec<String>, force: bool, config: &Config) -> Result<()> {
    let mut stored = Config::read(Some(config.path.clone()))?;

    if !force {
        let catalog = load_catalog(config)?;
        let remaining: Vec<String> = installed_names(&stored, &catalog)
            .into_iter()
            .filter(|name| !names.contains(name))
            .collect();
        for dependent in &remaining {
            let needs = catalog.resolve_dependencies(std::slice::from_ref(dependent))?;
            if let Some(needed) = needs.iter().find(|service| names.contains(&service.name)) {
                return Err(anyhow::anyhow!(
                    "{} is required by installed service {}; use --force to remove it anyway",
                    needed.name,
                    dependent
                ));
            }
        }
    }

    let mut removed = stored.remove_installed(&names);
    if removed.is_empty() {
        return Err(anyhow::anyhow!("No service removed: {} not installed", names.join(", ")));
    }
    stored.save()?;

    removed.sort();
    println!("Remove {} success", removed.join(", "));
    Ok(())
}

/// Print service definitions as YAML
pub async fn show_info(names: Vec<String>, config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    for name in &names {
        let service = catalog.get(name)?;
        let mut data = IndexMap::new();
        data.insert(name.as_str(), service);
        let yaml = serde_yaml::to_string(&data)
            .with_context(|| format!("Failed to describe service {}", name))?;
        println!("{}", yaml.trim_end());
    }
    Ok(())
}

/// Render services, writing them to the output directory or printing them
pub async fn render_services(
    names: Vec<String>,
    vars: Vec<String>,
    output: Option<PathBuf>,
    with_deps: bool,
    dry_run: bool,
    config: &Config,
) -> Result<Vec<Rendered>> {
    let overrides = Args::parse_variables(&vars)?;
    let catalog = load_catalog(config)?;
    let engine = build_engine(config, catalog.clone(), dry_run);
    let out_dir = output.unwrap_or_else(|| config.output_dir.clone());

    let (names, with_deps) = if names.is_empty() {
        let installed = installed_names(config, &catalog);
        if installed.is_empty() {
            return Err(anyhow::anyhow!(
                "No services given and none installed. Use `cntr add <NAME>` or name services to render"
            ));
        }
        (installed, true)
    } else {
        (names, with_deps)
    };

    let planned = engine.plan(&names, with_deps)?;
    engine.check_overrides(&planned, &overrides)?;
    info!(
        "Rendering {} service(s): {}",
        planned.len(),
        planned.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
    );

    let handles: Vec<_> = planned
        .iter()
        .map(|service| {
            let scoped = RenderEngine::scoped_overrides(service, &[&config.variables, &overrides]);
            let engine = engine.clone();
            let name = service.name.clone();
            let out_dir = out_dir.clone();
            tokio::task::spawn_blocking(move || -> crate::engine::Result<Rendered> {
                if dry_run {
                    Ok(Rendered::Preview(engine.render(&name, &scoped)?))
                } else {
                    Ok(Rendered::Written(engine.render_to(&name, &scoped, &out_dir)?))
                }
            })
        })
        .collect();

    let mut rendered = Vec::with_capacity(handles.len());
    for result in join_all(handles).await {
        rendered.push(result.map_err(EngineError::from)??);
    }

    for item in &rendered {
        match item {
            Rendered::Preview(artifact) => {
                println!("# {}/{}", artifact.service, artifact.file_name.display());
                print!("{}", artifact.document);
            }
            Rendered::Written(written) => {
                println!("✓ {} -> {}", written.service, written.document.display());
            }
        }
    }

    Ok(rendered)
}

/// Render every service with its defaults into a scratch directory and
/// validate that each document parses as YAML
pub async fn check_catalog(config: &Config) -> Result<CheckReport> {
    let catalog = load_catalog(config)?;
    let engine = build_engine(config, catalog.clone(), true);
    let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
    let writer = ArtifactWriter::new(scratch.path());

    let handles: Vec<_> = catalog
        .list()
        .into_iter()
        .map(|service| {
            let scoped = RenderEngine::scoped_overrides(service, &[&config.variables]);
            let engine = engine.clone();
            let writer = writer.clone();
            let name = service.name.clone();
            tokio::task::spawn_blocking(move || -> crate::engine::Result<()> {
                let artifact = engine.render(&name, &scoped)?;
                artifact.validate_yaml()?;
                writer.write(&artifact)?;
                Ok(())
            })
        })
        .collect();

    let mut report = CheckReport::default();
    let names: Vec<String> = catalog.list().iter().map(|s| s.name.clone()).collect();
    for (name, result) in names.into_iter().zip(join_all(handles).await) {
        match result.map_err(EngineError::from)? {
            Ok(()) => {
                debug!("{} passed", name);
                println!("✓ {}", name);
                report.passed.push(name);
            }
            Err(EngineError::Template(err @ TemplateError::MissingRequiredVariable { .. })) => {
                warn!("{} skipped: {}", name, err);
                println!("- {} (skipped: {})", name, err);
                report.skipped.push((name, err.to_string()));
            }
            Err(err) => {
                println!("✗ {}: {}", name, err);
                report.failed.push((name, err.to_string()));
            }
        }
    }

    println!(
        "{} passed, {} skipped, {} failed",
        report.passed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    if !report.is_success() {
        let failed: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        return Err(anyhow::anyhow!("Catalog check failed for: {}", failed.join(", ")));
    }
    Ok(report)
}

/// Persist variable overrides after checking the catalog knows them
pub async fn config_set(vars: Vec<String>, config: &Config) -> Result<()> {
    let variables = Args::parse_variables(&vars)?;
    let catalog = load_catalog(config)?;
    let known = catalog.known_variables();
    for key in variables.keys() {
        if !known.contains(key.as_str()) {
            return Err(anyhow::anyhow!(
                "Unknown variable '{}'. No service in {} uses it",
                key,
                catalog.root().display()
            ));
        }
    }

    let mut stored = Config::read(Some(config.path.clone()))?;
    stored.set_variables(variables.clone());
    stored.save()?;

    let mut keys: Vec<&String> = variables.keys().collect();
    keys.sort();
    for key in keys {
        println!("{}: {}", key, stored.variables[key.as_str()]);
    }
    info!("Saved {} variable(s) to {}", variables.len(), stored.path.display());
    Ok(())
}

/// Remove persisted overrides
pub async fn config_unset(keys: Vec<String>, config: &Config) -> Result<()> {
    let mut stored = Config::read(Some(config.path.clone()))?;
    let removed = stored.unset_variables(&keys);
    if removed.is_empty() {
        warn!("None of {} were set", keys.join(", "));
        return Ok(());
    }
    stored.save()?;
    println!("Unset {}", removed.join(", "));
    Ok(())
}

/// Show the effective value of every variable the installed services and
/// their dependencies declare, plus every persisted key
pub async fn config_list(config: &Config) -> Result<()> {
    let catalog = load_catalog(config)?;
    let engine = build_engine(config, catalog.clone(), true);
    let installed = installed_names(config, &catalog);

    let mut values: IndexMap<String, String> = IndexMap::new();
    for service in engine.plan(&installed, true)? {
        let scoped = RenderEngine::scoped_overrides(service, &[&config.variables]);
        for (key, value) in engine.effective(&service.name, &scoped)? {
            let shown = value.map(|v| v.to_string()).unwrap_or_else(|| "<unset>".to_string());
            values.entry(key).or_insert(shown);
        }
    }
    for (key, value) in &config.variables {
        values.entry(key.clone()).or_insert_with(|| value.clone());
    }

    values.sort_keys();
    for (key, value) in &values {
        println!("{}: {}", key, value);
    }
    Ok(())
}

/// Re-read the configuration file and check it against the catalog
pub async fn config_reload(config: &Config) -> Result<Config> {
    let mut reloaded = Config::read(Some(config.path.clone()))?;
    reloaded.merge_env(|key| std::env::var(key).ok());
    reloaded.catalog_dir = config.catalog_dir.clone();

    let catalog = load_catalog(&reloaded)?;
    let unknown: Vec<&str> = reloaded
        .installed
        .iter()
        .filter(|name| catalog.get(name).is_err())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(anyhow::anyhow!(
            "Installed service(s) {} not found in {}",
            unknown.join(", "),
            catalog.root().display()
        ));
    }
    let planned = catalog.resolve_dependencies(&reloaded.installed)?;

    let known = catalog.known_variables();
    for key in reloaded.variables.keys() {
        if !known.contains(key.as_str()) {
            warn!("Persisted variable {} is not used by any service", key);
        }
    }

    println!(
        "Reloaded {}: {} installed service(s), {} with dependencies, {} persisted variable(s)",
        reloaded.path.display(),
        reloaded.installed.len(),
        planned.len(),
        reloaded.variables.len()
    );
    Ok(reloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MANIFEST_FILE;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_service(root: &Path, name: &str, manifest: &str, template: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        fs::write(dir.join("compose.yml"), template).unwrap();
    }

    fn config_for(temp_dir: &TempDir) -> Config {
        let catalog = temp_dir.path().join("catalog");
        write_service(
            &catalog,
            "web",
            "order: 1\nvariables:\n  WEB_PORT: { default: 8080 }\n",
            "services:\n  web:\n    image: nginx\n    ports: [\"{{ WEB_PORT }}:80\"]\n",
        );
        write_service(
            &catalog,
            "vault",
            "order: 2\nvariables:\n  VAULT_TOKEN: { kind: string }\n",
            "services:\n  vault:\n    environment: [\"TOKEN={{ VAULT_TOKEN }}\"]\n",
        );
        Config {
            catalog_dir: catalog,
            output_dir: temp_dir.path().join("output"),
            install_path: Some(temp_dir.path().join("data")),
            path: temp_dir.path().join("cntr.yaml"),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_render_writes_output() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let rendered = render_services(
            vec!["web".to_string()],
            vec!["WEB_PORT=9000".to_string()],
            None,
            false,
            false,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(rendered.len(), 1);
        let document = fs::read_to_string(config.output_dir.join("web").join("compose.yml")).unwrap();
        assert!(document.contains("9000:80"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let rendered = render_services(vec!["web".to_string()], vec![], None, false, true, &config)
            .await
            .unwrap();

        match &rendered[0] {
            Rendered::Preview(artifact) => assert!(artifact.document.contains("8080:80")),
            other => panic!("expected preview, got {:?}", other),
        }
        assert!(!config.output_dir.exists());
    }

    #[tokio::test]
    async fn test_persisted_variables_apply_below_cli() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_for(&temp_dir);
        config.variables.insert("WEB_PORT".to_string(), "7000".to_string());
        config.variables.insert("VAULT_TOKEN".to_string(), "t".to_string());

        let rendered = render_services(vec!["web".to_string()], vec![], None, false, true, &config)
            .await
            .unwrap();
        let Rendered::Preview(artifact) = &rendered[0] else {
            panic!("expected preview");
        };
        assert!(artifact.document.contains("7000:80"));

        let rendered = render_services(
            vec!["web".to_string()],
            vec!["WEB_PORT=7001".to_string()],
            None,
            false,
            true,
            &config,
        )
        .await
        .unwrap();
        let Rendered::Preview(artifact) = &rendered[0] else {
            panic!("expected preview");
        };
        assert!(artifact.document.contains("7001:80"));
    }

    #[tokio::test]
    async fn test_render_rejects_unknown_variable() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let err = render_services(
            vec!["web".to_string()],
            vec!["NOPE=1".to_string()],
            None,
            false,
            true,
            &config,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[tokio::test]
    async fn test_check_skips_services_missing_required_values() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        let report = check_catalog(&config).await.unwrap();
        assert_eq!(report.passed, vec!["web".to_string()]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "vault");
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_check_reports_broken_template() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);
        write_service(
            &config.catalog_dir,
            "broken",
            "order: 3\n",
            "services:\n# {% if %}\n",
        );

        let err = check_catalog(&config).await.unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_config_set_and_unset() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        config_set(vec!["WEB_PORT=81".to_string()], &config).await.unwrap();
        let stored = Config::read(Some(config.path.clone())).unwrap();
        assert_eq!(stored.variables["WEB_PORT"], "81");

        assert!(config_set(vec!["NOPE=1".to_string()], &config).await.is_err());

        config_unset(vec!["WEB_PORT".to_string()], &config).await.unwrap();
        let stored = Config::read(Some(config.path.clone())).unwrap();
        assert!(stored.variables.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_renders_share_a_host_directory() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);
        for name in ["left", "right"] {
            let template = format!(
                "services:\n  {}:\n    volumes: [\"{{{{ (INSTALL_PATH ~ '/shared') | ensure_dir }}}}:/shared\"]\n",
                name
            );
            write_service(&config.catalog_dir, name, "order: 3\n", &template);
        }

        let rendered = render_services(
            vec!["left".to_string(), "right".to_string()],
            vec![],
            None,
            false,
            false,
            &config,
        )
        .await
        .unwrap();

        let shared = temp_dir.path().join("data").join("shared");
        assert!(shared.is_dir());
        assert_eq!(rendered.len(), 2);
        for item in &rendered {
            let Rendered::Written(written) = item else {
                panic!("expected written output, got {:?}", item);
            };
            let document = fs::read_to_string(&written.document).unwrap();
            assert!(document.contains(&format!("{}:/shared", shared.display())));
        }
    }

    #[tokio::test]
    async fn test_render_without_names_uses_installed_set() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_for(&temp_dir);
        write_service(
            &config.catalog_dir,
            "app",
            "order: 0\ndependencies: [web]\n",
            "services:\n  app:\n    image: app\n",
        );

        assert!(render_services(vec![], vec![], None, false, true, &config)
            .await
            .is_err());

        config.installed = vec!["app".to_string()];
        let rendered = render_services(vec![], vec![], None, false, true, &config)
            .await
            .unwrap();
        let names: Vec<&str> = rendered
            .iter()
            .map(|item| match item {
                Rendered::Preview(artifact) => artifact.service.as_str(),
                Rendered::Written(written) => written.service.as_str(),
            })
            .collect();
        assert_eq!(names, vec!["web", "app"]);
    }

    #[tokio::test]
    async fn test_add_and_remove_installed_services() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);
        write_service(
            &config.catalog_dir,
            "app",
            "order: 3\ndependencies: [web]\n",
            "services:\n  app:\n    image: app\n",
        );
        let installed = || Config::read(Some(config.path.clone())).unwrap().installed;

        add_services(vec!["app".to_string()], &config).await.unwrap();
        assert_eq!(installed(), vec!["app".to_string()]);
        assert!(add_services(vec!["app".to_string()], &config).await.is_err());
        assert!(add_services(vec!["ghost".to_string()], &config).await.is_err());

        add_services(vec!["web".to_string()], &config).await.unwrap();
        let err = remove_services(vec!["web".to_string()], false, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("app"));
        assert_eq!(installed(), vec!["app".to_string(), "web".to_string()]);

        remove_services(vec!["web".to_string()], true, &config).await.unwrap();
        assert_eq!(installed(), vec!["app".to_string()]);
        assert!(remove_services(vec!["web".to_string()], false, &config)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_config_list_tolerates_unset_required_values() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_for(&temp_dir);
        config.installed = vec!["vault".to_string(), "web".to_string()];
        config.variables.insert("WEB_PORT".to_string(), "81".to_string());

        config_list(&config).await.unwrap();
    }

    #[tokio::test]
    async fn test_config_reload_validates_installed_set() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_for(&temp_dir);

        fs::write(&config.path, "installed: [web, ghost]\n").unwrap();
        let err = config_reload(&config).await.unwrap_err();
        assert!(err.to_string().contains("ghost"));

        fs::write(&config.path, "installed: [web]\nvariables:\n  WEB_PORT: \"82\"\n").unwrap();
        let reloaded = config_reload(&config).await.unwrap();
        assert_eq!(reloaded.installed, vec!["web".to_string()]);
        assert_eq!(reloaded.variables["WEB_PORT"], "82");
        assert_eq!(reloaded.catalog_dir, config.catalog_dir);
    }
}
