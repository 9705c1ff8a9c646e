// ABOUTME: Integration tests for the service catalog shipped with the crate
// ABOUTME: Renders every entry with defaults and checks the flare examples end to end

use indexmap::IndexMap;
use std::sync::Arc;
use tempfile::TempDir;

mod common;
use common::{engine, overrides, shipped_catalog_dir, TEST_GID, TEST_UID};

use cntr::catalog::Catalog;
use cntr::engine::RenderEngine;
use cntr::template::DryRunPathOps;

fn shipped_engine() -> RenderEngine {
    let catalog = Arc::new(Catalog::load(shipped_catalog_dir()).expect("shipped catalog loads"));
    engine(
        catalog,
        "/srv/cntr".into(),
        Arc::new(DryRunPathOps::new(TEST_UID, TEST_GID)),
    )
}

#[test]
fn test_every_entry_renders_with_defaults() {
    let engine = shipped_engine();
    let names: Vec<String> = engine.catalog().names().iter().map(|s| s.to_string()).collect();
    assert!(names.contains(&"flare".to_string()));

    for name in names {
        let artifact = engine
            .render(&name, &IndexMap::new())
            .unwrap_or_else(|e| panic!("{} failed to render: {}", name, e));
        assert!(!artifact.document.contains("{{"), "{} left a substitution", name);
        assert!(!artifact.document.contains("{%"), "{} left a directive", name);

        let yaml = artifact
            .validate_yaml()
            .unwrap_or_else(|e| panic!("{} is not valid YAML: {}", name, e));
        assert!(
            yaml["services"].as_mapping().is_some(),
            "{} has no services section",
            name
        );
    }
}

#[test]
fn test_flare_with_login_and_port() {
    let artifact = shipped_engine()
        .render(
            "flare",
            &overrides(&[
                ("FLARE_EXPOSE_PORT", "7000"),
                ("FLARE_ENABLE_LOGIN", "true"),
                ("FLARE_USER", "admin"),
                ("FLARE_PASSWORD", "secret"),
            ]),
        )
        .unwrap();

    let document = &artifact.document;
    assert!(document.contains("7000:5005"));
    assert!(document.contains("FLARE_DISABLE_LOGIN=0"));
    assert!(document.contains("FLARE_USER=admin"));
    assert!(document.contains("FLARE_PASS=secret"));
    assert!(!document.contains("FLARE_DISABLE_LOGIN=1"));
    assert!(document.contains("/srv/cntr/flare/app:/app"));
    assert!(document.contains(&format!("\"{}:{}\"", TEST_UID, TEST_GID)));

    let yaml = artifact.validate_yaml().unwrap();
    let ports = yaml["services"]["flare"]["ports"].as_sequence().unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].as_str(), Some("7000:5005"));
}

#[test]
fn test_flare_without_port_has_no_ports_section() {
    let artifact = shipped_engine()
        .render("flare", &overrides(&[("FLARE_EXPOSE_PORT", "0")]))
        .unwrap();

    assert!(!artifact.document.contains("ports"));
    let yaml = artifact.validate_yaml().unwrap();
    assert!(yaml["services"]["flare"].get("ports").is_none());
}

#[test]
fn test_flare_without_login() {
    let artifact = shipped_engine()
        .render("flare", &overrides(&[("FLARE_ENABLE_LOGIN", "false")]))
        .unwrap();

    assert!(artifact.document.contains("FLARE_DISABLE_LOGIN=1"));
    assert!(artifact.document.contains("--nologin=1"));
    assert!(!artifact.document.contains("FLARE_DISABLE_LOGIN=0"));
    assert!(!artifact.document.contains("FLARE_PASS="));
}

#[test]
fn test_flare_quotes_free_text_credentials() {
    let artifact = shipped_engine()
        .render(
            "flare",
            &overrides(&[("FLARE_USER", "ops: \"root\""), ("FLARE_PASSWORD", "a\nb: [")]),
        )
        .unwrap();

    let yaml = artifact.validate_yaml().unwrap();
    let environment: Vec<&str> = yaml["services"]["flare"]["environment"]
        .as_sequence()
        .unwrap()
        .iter()
        .filter_map(|item| item.as_str())
        .collect();
    assert!(environment.contains(&"FLARE_USER=ops: \"root\""));
    assert!(environment.contains(&"FLARE_PASS=a\nb: ["));
}

#[test]
fn test_rendering_is_idempotent() {
    let engine = shipped_engine();
    let input = overrides(&[("FLARE_EXPOSE_PORT", "7000"), ("FLARE_USER", "me")]);

    let first = engine.render("flare", &input).unwrap();
    let second = engine.render("flare", &input).unwrap();
    assert_eq!(first.document, second.document);

    let out = TempDir::new().unwrap();
    let written_first = engine.render_to("flare", &input, out.path()).unwrap();
    let bytes_first = std::fs::read(&written_first.document).unwrap();
    let written_second = engine.render_to("flare", &input, out.path()).unwrap();
    let bytes_second = std::fs::read(&written_second.document).unwrap();
    assert_eq!(bytes_first, bytes_second);
}

#[test]
fn test_filebrowser_pulls_in_nginx() {
    let engine = shipped_engine();
    let planned = engine.plan(&["filebrowser".to_string()], true).unwrap();
    let names: Vec<&str> = planned.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["nginx", "filebrowser"]);
}

#[test]
fn test_nginx_ships_its_config() {
    let engine = shipped_engine();
    let out = TempDir::new().unwrap();
    let written = engine.render_to("nginx", &IndexMap::new(), out.path()).unwrap();

    assert_eq!(written.assets.len(), 1);
    assert!(out.path().join("nginx/conf/nginx.conf").is_file());
    let document = std::fs::read_to_string(&written.document).unwrap();
    assert!(document.contains("\"80:80\""));
    assert!(!document.contains("443"));
}
