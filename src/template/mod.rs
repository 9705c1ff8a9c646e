// ABOUTME: Template module for rendering Compose templates
// ABOUTME: Provides variable resolution, helpers and the rendering engine

pub mod engine;
pub mod error;
pub mod helpers;
pub mod resolver;
pub mod value;

pub use engine::TemplateEngine;
pub use error::{Result, TemplateError};
pub use helpers::{DryRunPathOps, HelperRegistry, HostPathOps, PathOps};
pub use resolver::{Builtins, VariableResolver};
pub use value::{Value, ValueKind, VariableSet};
