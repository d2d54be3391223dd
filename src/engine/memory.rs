//! In-memory engine.
//!
//! Holds a variable namespace and a console transcript behind a lock, and
//! understands a small expression language: literals, variable paths,
//! `name <- expr` assignment, `prop.table(table(x))`, and calls to functions
//! registered with [`InMemoryEngine::define_function`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{OnceLock, RwLock};

use log::debug;
use regex::Regex;

use crate::error::EngineError;
use crate::value::{split_path, Value};

use super::StatEngine;

/// A function callable from expressions. Receives the namespace and the raw
/// argument text between the parentheses.
pub type EngineFn =
    Box<dyn Fn(&mut HashMap<String, Value>, &str) -> Result<Value, String> + Send + Sync>;

const IDENT: &str = r"[A-Za-z.][A-Za-z0-9._]*";

fn compile(slot: &'static OnceLock<Regex>, pattern: impl FnOnce() -> String) -> &'static Regex {
    slot.get_or_init(|| Regex::new(&pattern()).expect("static expression grammar"))
}

fn path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compile(&RE, || format!(r"^{IDENT}(\${IDENT})*$"))
}

fn assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compile(&RE, || format!(r"^({IDENT}(?:\${IDENT})*)\s*<-\s*(.+)$"))
}

fn prop_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compile(&RE, || r"^prop\.table\(\s*table\(\s*(.+?)\s*\)\s*\)$".to_string())
}

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    compile(&RE, || format!(r"^({IDENT})\((.*)\)$"))
}

fn lock_err(context: &'static str) -> EngineError {
    EngineError::Backend {
        message: format!("poisoned lock: {context}"),
    }
}

fn eval_err(expr: &str, message: impl Into<String>) -> EngineError {
    EngineError::Evaluation {
        expr: expr.to_string(),
        message: message.into(),
    }
}

#[derive(Default)]
struct EngineState {
    vars: HashMap<String, Value>,
    functions: HashMap<String, EngineFn>,
    console: Vec<String>,
    evaluated: Vec<String>,
    prompts: usize,
    run_number: Option<u32>,
}

/// Thread-safe in-memory engine.
#[derive(Default)]
pub struct InMemoryEngine {
    state: RwLock<EngineState>,
}

impl fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("InMemoryEngine");
        if let Ok(state) = self.state.read() {
            let mut vars: Vec<&String> = state.vars.keys().collect();
            vars.sort();
            s.field("vars", &vars)
                .field("functions", &state.functions.len())
                .field("console_lines", &state.console.len());
        }
        s.finish_non_exhaustive()
    }
}

impl InMemoryEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function callable as `name(...)`.
    pub fn define_function<F>(&self, name: &str, f: F) -> Result<(), EngineError>
    where
        F: Fn(&mut HashMap<String, Value>, &str) -> Result<Value, String> + Send + Sync + 'static,
    {
        let mut state = self.state.write().map_err(|_| lock_err("define_function"))?;
        state.functions.insert(name.to_string(), Box::new(f));
        Ok(())
    }

    /// Current value of a variable path, if bound.
    pub fn get(&self, path: &str) -> Result<Option<Value>, EngineError> {
        let state = self.state.read().map_err(|_| lock_err("get"))?;
        Ok(lookup(&state.vars, path))
    }

    /// Lines written to the console so far.
    pub fn console(&self) -> Result<Vec<String>, EngineError> {
        let state = self.state.read().map_err(|_| lock_err("console"))?;
        Ok(state.console.clone())
    }

    /// Top-level expressions evaluated so far, in order.
    pub fn evaluated(&self) -> Result<Vec<String>, EngineError> {
        let state = self.state.read().map_err(|_| lock_err("evaluated"))?;
        Ok(state.evaluated.clone())
    }

    /// Number of interactive prompts presented.
    pub fn prompts(&self) -> Result<usize, EngineError> {
        let state = self.state.read().map_err(|_| lock_err("prompts"))?;
        Ok(state.prompts)
    }

    /// Run number most recently propagated by the bridge.
    pub fn run_number(&self) -> Result<Option<u32>, EngineError> {
        let state = self.state.read().map_err(|_| lock_err("run_number"))?;
        Ok(state.run_number)
    }
}

fn lookup(vars: &HashMap<String, Value>, path: &str) -> Option<Value> {
    let (root, rest) = split_path(path);
    vars.get(root)?.get_path(&rest)
}

fn bind(vars: &mut HashMap<String, Value>, path: &str, value: Value) {
    let (root, rest) = split_path(path);
    vars.entry(root.to_string()).or_default().set_path(&rest, value);
}

fn parse_literal(expr: &str) -> Option<Value> {
    if let Ok(v) = expr.parse::<f64>() {
        return Some(Value::scalar(v));
    }
    match expr {
        "NULL" => return Some(Value::Null),
        "TRUE" => return Some(Value::Logical(vec![true])),
        "FALSE" => return Some(Value::Logical(vec![false])),
        _ => {}
    }
    let quoted = expr.len() >= 2
        && ((expr.starts_with('"') && expr.ends_with('"'))
            || (expr.starts_with('\'') && expr.ends_with('\'')));
    quoted.then(|| Value::from(&expr[1..expr.len() - 1]))
}

/// Level label the way the engine prints factor levels.
fn level_label(v: f64) -> String {
    format!("{v}")
}

fn proportions(expr: &str, value: &Value) -> Result<Value, EngineError> {
    let mut labels = Vec::new();
    let mut counts = Vec::new();

    match value {
        Value::Character(items) => {
            let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
            for item in items {
                *tally.entry(item.as_str()).or_default() += 1;
            }
            for (label, n) in tally {
                labels.push(label.to_string());
                counts.push(n);
            }
        }
        other => {
            let Some(values) = other.as_doubles() else {
                return Err(eval_err(
                    expr,
                    format!("cannot tabulate a value of class {}", other.class()),
                ));
            };
            let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
            sorted.sort_by(f64::total_cmp);
            for v in sorted {
                if labels.last() == Some(&level_label(v)) {
                    if let Some(n) = counts.last_mut() {
                        *n += 1;
                    }
                } else {
                    labels.push(level_label(v));
                    counts.push(1);
                }
            }
        }
    }

    let total: usize = counts.iter().sum();
    #[allow(clippy::cast_precision_loss)]
    let props = counts
        .iter()
        .map(|n| if total == 0 { 0.0 } else { *n as f64 / total as f64 })
        .collect();
    Ok(Value::named_numeric(props, labels))
}

fn eval(state: &mut EngineState, expr: &str) -> Result<Value, EngineError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(Value::Null);
    }

    if let Some(caps) = assign_re().captures(expr) {
        let value = eval(state, &caps[2])?;
        bind(&mut state.vars, &caps[1], value.clone());
        return Ok(value);
    }

    if let Some(value) = parse_literal(expr) {
        return Ok(value);
    }

    if let Some(caps) = prop_table_re().captures(expr) {
        let inner = eval(state, &caps[1])?;
        return proportions(expr, &inner);
    }

    if let Some(caps) = call_re().captures(expr) {
        let EngineState { vars, functions, .. } = state;
        let name = &caps[1];
        let Some(f) = functions.get(name) else {
            return Err(eval_err(expr, format!("could not find function \"{name}\"")));
        };
        return f(vars, &caps[2]).map_err(|message| eval_err(expr, message));
    }

    if path_re().is_match(expr) {
        return lookup(&state.vars, expr)
            .ok_or_else(|| eval_err(expr, format!("object '{expr}' not found")));
    }

    Err(eval_err(expr, "unexpected input"))
}

impl StatEngine for InMemoryEngine {
    fn evaluate(&self, expr: &str) -> Result<Value, EngineError> {
        let mut state = self.state.write().map_err(|_| lock_err("evaluate"))?;
        state.evaluated.push(expr.to_string());
        let result = eval(&mut state, expr);
        debug!("evaluated {expr:?}: {}", if result.is_ok() { "ok" } else { "error" });
        result
    }

    fn assign(&self, name: &str, value: Value) -> Result<(), EngineError> {
        if !path_re().is_match(name.trim()) {
            return Err(EngineError::Assignment {
                name: name.to_string(),
                message: "not a valid variable name".to_string(),
            });
        }
        let mut state = self.state.write().map_err(|_| lock_err("assign"))?;
        bind(&mut state.vars, name.trim(), value);
        Ok(())
    }

    fn assign_from(&self, target: &str, source: &str) -> Result<(), EngineError> {
        let value = self.get(source)?.ok_or_else(|| EngineError::Assignment {
            name: target.to_string(),
            message: format!("object '{source}' not found"),
        })?;
        self.assign(target, value)
    }

    fn echo(&self, text: &str) {
        if let Ok(mut state) = self.state.write() {
            state.console.push(text.to_string());
        }
    }

    fn print_prompt(&self) {
        if let Ok(mut state) = self.state.write() {
            state.prompts += 1;
            state.console.push("> ".to_string());
        }
    }

    fn set_run_number(&self, run: u32) {
        if let Ok(mut state) = self.state.write() {
            state.run_number = Some(run);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_and_lookup_nested_paths() {
        let engine = InMemoryEngine::new();
        engine.assign("env.scenario$catadjs$fsmoke", Value::scalar(1.0)).unwrap();
        assert_eq!(
            engine.evaluate("env.scenario$catadjs$fsmoke").unwrap(),
            Value::scalar(1.0)
        );
        assert!(engine.evaluate("env.scenario$catadjs").unwrap().is_list());
    }

    #[test]
    fn assign_from_copies_value() {
        let engine = InMemoryEngine::new();
        engine.assign(".tmp", Value::numeric(vec![1.0, 2.0])).unwrap();
        engine.assign_from("lst$slot", ".tmp").unwrap();
        assert_eq!(engine.get("lst$slot").unwrap(), Some(Value::numeric(vec![1.0, 2.0])));
        assert!(engine.assign_from("x", "missing").is_err());
    }

    #[test]
    fn prop_table_over_numeric_levels() {
        let engine = InMemoryEngine::new();
        engine
            .assign("people", Value::numeric(vec![2.0, 1.0, 2.0, 2.0]))
            .unwrap();
        let props = engine.evaluate("prop.table(table(people))").unwrap();
        assert_eq!(props.names().unwrap(), ["1".to_string(), "2".to_string()]);
        assert_eq!(props.as_doubles().unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn prop_table_over_text_levels() {
        let engine = InMemoryEngine::new();
        engine
            .assign(
                "kids",
                Value::Character(vec!["B".into(), "A".into(), "B".into(), "B".into()]),
            )
            .unwrap();
        let props = engine.evaluate("prop.table(table(kids))").unwrap();
        assert_eq!(props.names().unwrap(), ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn assignment_expression_and_literals() {
        let engine = InMemoryEngine::new();
        let v = engine.evaluate("it <- 7").unwrap();
        assert_eq!(v, Value::scalar(7.0));
        assert_eq!(engine.get("it").unwrap(), Some(Value::scalar(7.0)));
        assert_eq!(engine.evaluate("'a'").unwrap(), Value::from("a"));
    }

    #[test]
    fn registered_functions_receive_raw_args() {
        let engine = InMemoryEngine::new();
        engine
            .define_function("f", |vars, args| {
                vars.insert("last".to_string(), Value::from(args));
                Ok(Value::Null)
            })
            .unwrap();
        engine.evaluate("f(7)").unwrap();
        assert_eq!(engine.get("last").unwrap(), Some(Value::from("7")));
        assert_eq!(engine.evaluated().unwrap(), vec!["f(7)".to_string()]);
    }

    #[test]
    fn unknown_names_fail_to_evaluate() {
        let engine = InMemoryEngine::new();
        assert!(matches!(
            engine.evaluate("nope"),
            Err(EngineError::Evaluation { .. })
        ));
        assert!(matches!(
            engine.evaluate("g(1)"),
            Err(EngineError::Evaluation { ref message, .. }) if message.contains("could not find function")
        ));
        assert!(engine.assign("1bad", Value::Null).is_err());
    }

    #[test]
    fn console_and_prompt() {
        let engine = InMemoryEngine::new();
        engine.echo("");
        engine.print_prompt();
        engine.set_run_number(3);
        assert_eq!(engine.console().unwrap(), vec![String::new(), "> ".to_string()]);
        assert_eq!(engine.prompts().unwrap(), 1);
        assert_eq!(engine.run_number().unwrap(), Some(3));
    }
}
