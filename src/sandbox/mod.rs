use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

use crate::models::*;

/// Identifiers a transform script may not reference. The scan is a fast
/// pre-flight reject; actual isolation comes from the interpreter, which has
/// no filesystem, network, process, or store bindings registered and has
/// `eval` disabled at the engine level.
pub const DENY_LIST: &[&str] = &[
    "eval",
    "import",
    "export",
    "print",
    "debug",
    "exit",
    "sleep",
    "spawn",
    "process",
    "env",
    "exec",
    "system",
    "shell",
    "fetch",
    "connect",
    "socket",
    "open_file",
    "read_file",
    "write_file",
    "remove_file",
    "set_timeout",
    "set_interval",
    "timestamp",
];

const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_FN_EXPR_DEPTH: usize = 32;
const MAX_STRING_SIZE: usize = 1_000_000;
const MAX_COLLECTION_SIZE: usize = 100_000;

/// A compiled transform script: a single function of one argument, invoked
/// once per record against a fresh scope so no state carries across records.
/// The compiled AST is shared read-only for the whole run.
pub struct TransformSandbox {
    engine: Engine,
    ast: AST,
    fn_name: String,
}

impl std::fmt::Debug for TransformSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformSandbox")
            .field("fn_name", &self.fn_name)
            .finish_non_exhaustive()
    }
}

impl TransformSandbox {
    /// Pre-flight validation and compilation: deny-list scan, compile, and
    /// single-function shape check, all before any record is processed.
    pub fn compile(script: &str, max_operations: u64) -> Result<Self> {
        scan_deny_list(script)?;

        let engine = hardened_engine(max_operations);
        let ast = engine
            .compile(script)
            .map_err(|e| ImportError::ScriptParse(e.to_string()))?;

        let fn_name = {
            let mut functions = ast.iter_functions();
            let first = functions.next().ok_or_else(|| {
                ImportError::ScriptParse(
                    "script must define a transform function".to_string(),
                )
            })?;
            if functions.next().is_some() {
                return Err(ImportError::ScriptParse(
                    "script must define exactly one function".to_string(),
                ));
            }
            if first.params.len() != 1 {
                return Err(ImportError::ScriptParse(format!(
                    "transform function '{}' must take exactly one argument",
                    first.name
                )));
            }
            first.name.to_string()
        };

        Ok(Self { engine, ast, fn_name })
    }

    /// Pre-flight only: validate without keeping the compiled script.
    pub fn validate(script: &str, max_operations: u64) -> Result<()> {
        Self::compile(script, max_operations).map(|_| ())
    }

    /// Run the transform against one document.
    ///
    /// Returns `None` when the function returns unit, which the session
    /// treats as "keep the original content".
    pub fn apply(&self, document: &Value) -> Result<Option<Value>> {
        let arg = rhai::serde::to_dynamic(document)
            .map_err(|e| ImportError::Transform(e.to_string()))?;

        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, &self.fn_name, (arg,))
            .map_err(|e| ImportError::Transform(e.to_string()))?;

        if result.is::<()>() {
            return Ok(None);
        }

        let value: Value = rhai::serde::from_dynamic(&result)
            .map_err(|e| ImportError::Transform(e.to_string()))?;
        Ok(Some(value))
    }
}

fn hardened_engine(max_operations: u64) -> Engine {
    let mut engine = Engine::new();
    engine.disable_symbol("eval");
    engine.set_max_operations(max_operations);
    engine.set_max_call_levels(MAX_CALL_LEVELS);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH);
    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_max_array_size(MAX_COLLECTION_SIZE);
    engine.set_max_map_size(MAX_COLLECTION_SIZE);
    engine
}

fn scan_deny_list(script: &str) -> Result<()> {
    let mut ident = String::new();
    for ch in script.chars().chain(std::iter::once(' ')) {
        if ch.is_alphanumeric() || ch == '_' {
            ident.push(ch);
            continue;
        }
        if !ident.is_empty() {
            if DENY_LIST.contains(&ident.as_str()) {
                return Err(ImportError::UnsafeScript(format!(
                    "disallowed identifier '{}'",
                    ident
                )));
            }
            ident.clear();
        }
    }
    Ok(())
}
