// ABOUTME: Helper functions callable from templates and the filesystem capability they use
// ABOUTME: Filesystem side effects go through PathOps so rendering stays testable without disk

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::resolver::{BUILTIN_INSTALL_PATH, BUILTIN_SERVICE_NAME};
use super::value::{Value, VariableSet};

/// Filesystem operations a template may trigger.
///
/// `ensure_dir` must be idempotent: calling it twice with the same path
/// succeeds both times and returns the same path.
pub trait PathOps: Send + Sync {
    fn ensure_dir(&self, path: &Path) -> io::Result<PathBuf>;
    fn owner(&self, path: &Path) -> io::Result<String>;
}

/// Real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostPathOps;

impl PathOps for HostPathOps {
    fn ensure_dir(&self, path: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(path)?;
        Ok(path.to_path_buf())
    }

    #[cfg(unix)]
    fn owner(&self, path: &Path) -> io::Result<String> {
        use std::os::unix::fs::MetadataExt;

        let metadata = fs::metadata(path)?;
        Ok(format!("{}:{}", metadata.uid(), metadata.gid()))
    }

    #[cfg(not(unix))]
    fn owner(&self, _path: &Path) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file ownership is only available on unix",
        ))
    }
}

/// Touches nothing: directories are reported as created and every path is
/// owned by the configured uid/gid.
#[derive(Debug, Clone)]
pub struct DryRunPathOps {
    uid: u32,
    gid: u32,
}

impl DryRunPathOps {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

impl PathOps for DryRunPathOps {
    fn ensure_dir(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn owner(&self, _path: &Path) -> io::Result<String> {
        Ok(format!("{}:{}", self.uid, self.gid))
    }
}

/// Why a helper call failed.
#[derive(Debug)]
pub enum HelperFailure {
    Invalid(String),
    Io { path: PathBuf, source: io::Error },
}

pub type HelperResult = std::result::Result<Value, HelperFailure>;

/// What a helper can see while it runs.
pub struct HelperContext<'a> {
    pub service: &'a str,
    pub variables: &'a VariableSet,
    pub path_ops: &'a dyn PathOps,
}

pub type HelperFn = fn(&HelperContext<'_>, &[Value]) -> HelperResult;

#[derive(Clone, Copy)]
pub struct HelperDef {
    pub min_args: usize,
    pub max_args: usize,
    pub func: HelperFn,
}

#[derive(Clone, Default)]
pub struct HelperRegistry {
    helpers: HashMap<String, HelperDef>,
}

impl HelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in helper.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("app_path", 0, 1, app_path_helper);
        registry.register("ensure_dir", 1, 1, ensure_dir_helper);
        registry.register("owner", 1, 1, owner_helper);
        registry.register("upper", 1, 1, upper_helper);
        registry.register("lower", 1, 1, lower_helper);
        registry.register("default", 2, 2, default_helper);
        registry.register("base64_encode", 1, 1, base64_encode_helper);
        registry.register("quote", 1, 1, quote_helper);
        registry
    }

    pub fn register(&mut self, name: &str, min_args: usize, max_args: usize, func: HelperFn) {
        self.helpers.insert(
            name.to_string(),
            HelperDef {
                min_args,
                max_args,
                func,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&HelperDef> {
        self.helpers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.helpers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn string_arg<'v>(args: &'v [Value], index: usize, helper: &str) -> Result<&'v str, HelperFailure> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s),
        Some(other) => Err(HelperFailure::Invalid(format!(
            "{} expects a string argument, got '{}'",
            helper, other
        ))),
        None => Err(HelperFailure::Invalid(format!("{} is missing an argument", helper))),
    }
}

fn io_failure(path: &Path) -> impl FnOnce(io::Error) -> HelperFailure + '_ {
    move |source| HelperFailure::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `INSTALL_PATH/SERVICE_NAME[/sub]`
fn app_path_helper(ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    let lookup = |name: &str| {
        ctx.variables
            .get(name)
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| HelperFailure::Invalid(format!("app_path requires {} to be set", name)))
    };

    let mut path = PathBuf::from(lookup(BUILTIN_INSTALL_PATH)?);
    path.push(lookup(BUILTIN_SERVICE_NAME)?);
    if !args.is_empty() {
        let sub = Path::new(string_arg(args, 0, "app_path")?);
        // PathBuf::push replaces the whole path when given an absolute one
        let contained = sub
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(HelperFailure::Invalid(format!(
                "app_path sub-path '{}' must stay inside the service directory",
                sub.display()
            )));
        }
        path.push(sub);
    }
    Ok(Value::Str(path.display().to_string()))
}

fn ensure_dir_helper(ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    let path = Path::new(string_arg(args, 0, "ensure_dir")?);
    let created = ctx.path_ops.ensure_dir(path).map_err(io_failure(path))?;
    Ok(Value::Str(created.display().to_string()))
}

fn owner_helper(ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    let path = Path::new(string_arg(args, 0, "owner")?);
    let owner = ctx.path_ops.owner(path).map_err(io_failure(path))?;
    Ok(Value::Str(owner))
}

fn upper_helper(_ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    Ok(Value::Str(args[0].to_string().to_uppercase()))
}

fn lower_helper(_ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    Ok(Value::Str(args[0].to_string().to_lowercase()))
}

/// Falls back when the value is falsy.
fn default_helper(_ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    if args[0].is_truthy() {
        Ok(args[0].clone())
    } else {
        Ok(args[1].clone())
    }
}

fn base64_encode_helper(_ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    Ok(Value::Str(BASE64.encode(args[0].to_string().as_bytes())))
}

/// Double-quoted YAML scalar. Line breaks and tabs become escapes so the
/// value can never start a new mapping entry.
fn quote_helper(_ctx: &HelperContext<'_>, args: &[Value]) -> HelperResult {
    let raw = args[0].to_string();
    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');
    for c in raw.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => quoted.push_str(&format!("\\u{:04X}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    Ok(Value::Str(quoted))
}
