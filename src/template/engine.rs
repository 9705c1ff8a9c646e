// ABOUTME: Template engine that renders Compose templates against resolved variables
// ABOUTME: Wraps minijinja with strict undefined handling and the cntr helper set

use minijinja::value::Rest;
use minijinja::{AutoEscape, Environment, ErrorKind, Template, UndefinedBehavior};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::error::{Result, TemplateError};
use super::helpers::{HelperContext, HelperDef, HelperFailure, HelperFn, HelperRegistry, PathOps};
use super::value::{Value, VariableSet};

#[derive(Clone)]
pub struct TemplateEngine {
    helpers: HelperRegistry,
    path_ops: Arc<dyn PathOps>,
}

/// State shared by every helper call of a single render.
struct RenderScope {
    service: String,
    variables: VariableSet,
    path_ops: Arc<dyn PathOps>,
    failure: Mutex<Option<(String, HelperFailure)>>,
}

impl RenderScope {
    fn record(&self, helper: &str, failure: HelperFailure) -> minijinja::Error {
        let message = match &failure {
            HelperFailure::Invalid(message) => message.clone(),
            HelperFailure::Io { path, source } => format!("{}: {}", path.display(), source),
        };
        if let Ok(mut slot) = self.failure.lock() {
            *slot = Some((helper.to_string(), failure));
        }
        minijinja::Error::new(ErrorKind::InvalidOperation, message)
    }

    fn take_failure(&self) -> Option<(String, HelperFailure)> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl TemplateEngine {
    /// Create a template engine with all built-in helpers
    pub fn new(path_ops: Arc<dyn PathOps>) -> Self {
        Self {
            helpers: HelperRegistry::builtin(),
            path_ops,
        }
    }

    /// Register an additional helper, replacing any built-in of the same name
    pub fn register_helper(&mut self, name: &str, min_args: usize, max_args: usize, func: HelperFn) {
        self.helpers.register(name, min_args, max_args, func);
    }

    /// Check template syntax without rendering
    pub fn validate_template(&self, service: &str, template: &str) -> Result<()> {
        let scope = Arc::new(self.scope(service, VariableSet::new()));
        let source = uncomment_directives(template);
        let env = self.environment(&scope);
        env.template_from_named_str(service, &source)
            .map_err(|err| self.map_error(&scope, err))?;
        Ok(())
    }

    /// Render `template` for `service` with `variables`.
    ///
    /// Every variable the template references, in any branch, must be present.
    /// A helper pipeline stops at its first failing stage; side effects of the
    /// stages before it are kept.
    pub fn render(&self, service: &str, template: &str, variables: &VariableSet) -> Result<String> {
        let scope = Arc::new(self.scope(service, variables.clone()));
        let source = uncomment_directives(template);
        let env = self.environment(&scope);
        let compiled = env
            .template_from_named_str(service, &source)
            .map_err(|err| self.map_error(&scope, err))?;

        self.check_referenced(&scope, &compiled, &source)?;

        compiled
            .render(&scope.variables)
            .map_err(|err| self.map_error(&scope, err))
    }

    fn scope(&self, service: &str, variables: VariableSet) -> RenderScope {
        RenderScope {
            service: service.to_string(),
            variables,
            path_ops: self.path_ops.clone(),
            failure: Mutex::new(None),
        }
    }

    fn environment<'source>(&self, scope: &Arc<RenderScope>) -> Environment<'source> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        // Every helper works both as a call and as a pipeline stage.
        for name in self.helpers.names() {
            if let Some(def) = self.helpers.get(name) {
                env.add_function(name.to_string(), helper_callable(name, *def, scope.clone()));
                env.add_filter(name.to_string(), helper_callable(name, *def, scope.clone()));
            }
        }
        env
    }

    /// Fails on the first variable the template mentions anywhere, taken
    /// branch or not, that has no value.
    fn check_referenced(&self, scope: &RenderScope, compiled: &Template<'_, '_>, source: &str) -> Result<()> {
        let mut referenced: Vec<String> = compiled.undeclared_variables(false).into_iter().collect();
        referenced.sort();

        let missing = referenced.into_iter().find(|name| {
            !scope.variables.contains(name)
                && self.helpers.get(name).is_none()
                && !is_call_target(source, name)
        });
        match missing {
            Some(variable) => {
                debug!("{} references unset variable {}", scope.service, variable);
                Err(TemplateError::MissingRequiredVariable {
                    variable,
                    service: scope.service.clone(),
                })
            }
            None => Ok(()),
        }
    }

    fn map_error(&self, scope: &RenderScope, err: minijinja::Error) -> TemplateError {
        let service = scope.service.clone();
        let line = err.line().unwrap_or(0);

        if let Some((helper, failure)) = scope.take_failure() {
            return match failure {
                HelperFailure::Invalid(message) => TemplateError::HelperEvaluation {
                    service,
                    line,
                    helper,
                    message,
                },
                HelperFailure::Io { path, source } => TemplateError::Filesystem { path, source },
            };
        }

        let message = err
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        match err.kind() {
            ErrorKind::UnknownFilter | ErrorKind::UnknownFunction => TemplateError::HelperEvaluation {
                service,
                line,
                helper: unknown_name(&message),
                message: format!(
                    "{}; available helpers: {}",
                    message,
                    self.helpers.names().join(", ")
                ),
            },
            _ => TemplateError::TemplateSyntax {
                service,
                line,
                message,
            },
        }
    }
}

/// Adapts a registry helper to a minijinja callable that checks arity and
/// records why it failed.
fn helper_callable(
    name: &str,
    def: HelperDef,
    scope: Arc<RenderScope>,
) -> impl Fn(Rest<minijinja::Value>) -> std::result::Result<minijinja::Value, minijinja::Error>
       + Send
       + Sync
       + 'static {
    let name = name.to_string();
    move |args: Rest<minijinja::Value>| {
        let args: Vec<Value> = args.iter().map(Value::from).collect();
        if args.len() < def.min_args || args.len() > def.max_args {
            let expected = if def.min_args == def.max_args {
                def.min_args.to_string()
            } else {
                format!("{} to {}", def.min_args, def.max_args)
            };
            let message = format!("expected {} argument(s), got {}", expected, args.len());
            return Err(scope.record(&name, HelperFailure::Invalid(message)));
        }

        let ctx = HelperContext {
            service: &scope.service,
            variables: &scope.variables,
            path_ops: scope.path_ops.as_ref(),
        };
        (def.func)(&ctx, &args)
            .map(|value| minijinja::Value::from(&value))
            .map_err(|failure| scope.record(&name, failure))
    }
}

/// Turns `# {% ... %}` lines into plain block lines so that
/// `lstrip_blocks`/`trim_blocks` drop them entirely. Line numbers are kept.
fn uncomment_directives(template: &str) -> String {
    template
        .split_inclusive('\n')
        .map(|line| {
            let body = line.trim_end_matches(['\n', '\r']);
            let indent = body.len() - body.trim_start().len();
            match body[indent..].strip_prefix('#').map(str::trim) {
                Some(rest) if is_block_tag(rest) => {
                    format!("{}{}{}", &body[..indent], rest, &line[body.len()..])
                }
                _ => line.to_string(),
            }
        })
        .collect()
}

fn is_block_tag(text: &str) -> bool {
    text.len() >= 4
        && text.starts_with("{%")
        && text.ends_with("%}")
        && !text[2..text.len() - 2].contains("%}")
}

/// True when `name` appears in `source` directly followed by `(`, which makes
/// it a helper call rather than a variable reference.
fn is_call_target(source: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    source.match_indices(name).any(|(start, _)| {
        let before = source[..start].chars().next_back();
        let after = source[start + name.len()..].trim_start().chars().next();
        !before.is_some_and(is_ident) && after == Some('(')
    })
}

/// Pulls the helper name out of minijinja's "filter x is unknown" detail.
fn unknown_name(detail: &str) -> String {
    detail
        .trim_end_matches(" is unknown")
        .rsplit(' ')
        .next()
        .unwrap_or(detail)
        .to_string()
}
