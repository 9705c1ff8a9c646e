// ABOUTME: Variable resolution for a single service render
// ABOUTME: Merges built-ins, service defaults, environment and overrides into a VariableSet

use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use super::error::{Result, TemplateError};
use super::value::{Value, ValueKind, VariableSet};
use crate::catalog::ServiceDefinition;

pub const BUILTIN_UID: &str = "UID";
pub const BUILTIN_GID: &str = "GID";
pub const BUILTIN_INSTALL_PATH: &str = "INSTALL_PATH";
pub const BUILTIN_SERVICE_NAME: &str = "SERVICE_NAME";

/// Built-in names and their kinds, in the order they enter a VariableSet.
pub const BUILTINS: [(&str, ValueKind); 4] = [
    (BUILTIN_UID, ValueKind::Int),
    (BUILTIN_GID, ValueKind::Int),
    (BUILTIN_INSTALL_PATH, ValueKind::String),
    (BUILTIN_SERVICE_NAME, ValueKind::String),
];

/// Values computed from the host rather than declared by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtins {
    pub uid: u32,
    pub gid: u32,
    pub install_path: PathBuf,
}

impl Builtins {
    pub fn new(uid: u32, gid: u32, install_path: impl Into<PathBuf>) -> Self {
        Self {
            uid,
            gid,
            install_path: install_path.into(),
        }
    }

    /// Use the ids of the current process.
    #[cfg(unix)]
    pub fn detect(install_path: impl Into<PathBuf>) -> Self {
        let uid = unsafe { libc::getuid() };
        let gid = unsafe { libc::getgid() };
        Self::new(uid, gid, install_path)
    }

    #[cfg(not(unix))]
    pub fn detect(install_path: impl Into<PathBuf>) -> Self {
        Self::new(0, 0, install_path)
    }
}

#[derive(Debug, Clone)]
pub struct VariableResolver {
    builtins: Builtins,
}

impl VariableResolver {
    pub fn new(builtins: Builtins) -> Self {
        Self { builtins }
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Names a caller may set for `service`: built-ins plus declared variables.
    pub fn recognized(service: &ServiceDefinition) -> Vec<&str> {
        let mut names: Vec<&str> = BUILTINS.iter().map(|(name, _)| *name).collect();
        for name in service.variables.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        names
    }

    /// Resolve the effective variables for one render.
    ///
    /// Precedence, lowest first: built-ins, service defaults, `environment`
    /// entries named after a variable the service declares, `overrides`.
    /// Built-ins are never read from the environment. Every override key must
    /// be recognized.
    pub fn resolve(
        &self,
        service: &ServiceDefinition,
        environment: &HashMap<String, String>,
        overrides: &IndexMap<String, String>,
    ) -> Result<VariableSet> {
        let variables = self.layered(service, environment, overrides)?;

        for name in service.variables.keys() {
            if !variables.contains(name) {
                return Err(TemplateError::MissingRequiredVariable {
                    variable: name.clone(),
                    service: service.name.clone(),
                });
            }
        }

        debug!(
            "Resolved {} variables for service {}",
            variables.len(),
            service.name
        );
        Ok(variables)
    }

    /// Value each declared variable of `service` would take, `None` for a
    /// required variable nothing sets yet.
    pub fn effective(
        &self,
        service: &ServiceDefinition,
        environment: &HashMap<String, String>,
        overrides: &IndexMap<String, String>,
    ) -> Result<IndexMap<String, Option<Value>>> {
        let variables = self.layered(service, environment, overrides)?;
        Ok(service
            .variables
            .keys()
            .map(|name| (name.clone(), variables.get(name).cloned()))
            .collect())
    }

    fn layered(
        &self,
        service: &ServiceDefinition,
        environment: &HashMap<String, String>,
        overrides: &IndexMap<String, String>,
    ) -> Result<VariableSet> {
        let recognized = Self::recognized(service);
        if let Some(unknown) = overrides.keys().find(|k| !recognized.contains(&k.as_str())) {
            return Err(TemplateError::UnknownVariable {
                variable: unknown.clone(),
                service: service.name.clone(),
                known: recognized.iter().map(|s| s.to_string()).collect(),
            });
        }

        let mut variables = VariableSet::new();
        variables.set(BUILTIN_UID, i64::from(self.builtins.uid));
        variables.set(BUILTIN_GID, i64::from(self.builtins.gid));
        variables.set(
            BUILTIN_INSTALL_PATH,
            self.builtins.install_path.display().to_string(),
        );
        variables.set(BUILTIN_SERVICE_NAME, service.name.clone());

        for (name, decl) in &service.variables {
            if let Some(default) = &decl.default {
                variables.set(name.clone(), default.clone());
            }
        }

        // Generic names such as UID or SERVICE_NAME are often already set in
        // a shell, so only declared variables come from the environment.
        for name in service.variables.keys() {
            if let Some(raw) = environment.get(name) {
                debug!("{}: {} taken from environment", service.name, name);
                let value = self.coerce(service, name, raw)?;
                variables.set(name.clone(), value);
            }
        }

        for (name, raw) in overrides {
            let value = self.coerce(service, name, raw)?;
            variables.set(name.clone(), value);
        }

        Ok(variables)
    }

    fn coerce(&self, service: &ServiceDefinition, name: &str, raw: &str) -> Result<Value> {
        let kind = Self::kind_of(service, name);
        Value::parse_as(kind, raw).ok_or_else(|| TemplateError::InvalidValue {
            variable: name.to_string(),
            service: service.name.clone(),
            value: raw.to_string(),
            expected: kind.describe(),
        })
    }

    fn kind_of(service: &ServiceDefinition, name: &str) -> ValueKind {
        if let Some(decl) = service.variables.get(name) {
            return decl.kind();
        }
        BUILTINS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, kind)| *kind)
            .unwrap_or(ValueKind::String)
    }
}
