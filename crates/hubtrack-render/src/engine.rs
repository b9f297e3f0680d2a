//! Go template evaluator
//!
//! Templates are parsed once and evaluated against a [`Value`] tree. Named
//! templates (`define`) are shared between every template registered in
//! the engine, as they are in Helm.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::ast::{Command, Literal, Node, Operand, Pipeline};
use crate::error::{RenderError, Result};
use crate::functions;
use crate::parser;
use crate::value::Value;

/// Maximum nesting of `include`, `template` and `tpl` calls
pub const MAX_DEPTH: usize = 100;

/// Name given to templates evaluated through `tpl`
const TPL_NAME: &str = "gotpl";

/// Template engine holding parsed templates and their named definitions
#[derive(Debug, Default)]
pub struct Engine {
    defines: HashMap<String, Rc<Vec<Node>>>,
    templates: BTreeMap<String, Rc<Vec<Node>>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register a template
    ///
    /// Named templates defined in `source` replace earlier definitions with
    /// the same name.
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<()> {
        let template = parser::parse(name, source)?;
        for (define, body) in template.defines {
            self.defines.insert(define, Rc::new(body));
        }
        self.templates.insert(name.to_string(), Rc::new(template.nodes));
        Ok(())
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Names of the registered templates, sorted
    pub fn template_names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    /// Render a registered template with `data` as both `.` and `$`
    pub fn render(&self, name: &str, data: &Value) -> Result<String> {
        let nodes = self
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))?;

        let mut exec = Exec {
            engine: self,
            vars: vec![(String::new(), data.clone())],
            locals: HashMap::new(),
            depth: 0,
        };

        let mut out = String::new();
        exec.walk(&nodes, data, &mut out)
            .map_err(|e| in_template(name, e))?;
        Ok(out)
    }

    /// Parse and render a one-off template
    pub fn render_str(name: &str, source: &str, data: &Value) -> Result<String> {
        let mut engine = Engine::new();
        engine.add_template(name, source)?;
        engine.render(name, data)
    }
}

/// Attach a template name to an error raised while executing it
fn in_template(name: &str, err: RenderError) -> RenderError {
    match err {
        RenderError::Exec { template, message } if template.is_empty() => {
            RenderError::exec(name, message)
        }
        e @ (RenderError::Exec { .. } | RenderError::Parse { .. }) => e,
        other => RenderError::exec(name, other.to_string()),
    }
}

/// Execution error whose template is filled in by [`in_template`]
fn exec_error(message: impl Into<String>) -> RenderError {
    RenderError::exec("", message)
}

/// How a list of nodes finished
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Evaluation state of a single render
struct Exec<'a> {
    engine: &'a Engine,
    vars: Vec<(String, Value)>,
    /// Definitions made by templates evaluated through `tpl`
    locals: HashMap<String, Rc<Vec<Node>>>,
    depth: usize,
}

impl Exec<'_> {
    fn walk(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<Flow> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output(pipeline) => {
                    let value = self.pipeline(pipeline, dot)?;
                    if pipeline.decl.is_none() {
                        out.push_str(&printable(&value));
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let mut chosen = otherwise;
                    for (condition, body) in branches {
                        if self.pipeline(condition, dot)?.is_truthy() {
                            chosen = body;
                            break;
                        }
                    }
                    let flow = self.walk(chosen, dot, out)?;
                    self.vars.truncate(mark);
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
                Node::With {
                    branches,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let mut chosen = None;
                    for (condition, body) in branches {
                        let value = self.pipeline(condition, dot)?;
                        if value.is_truthy() {
                            chosen = Some((body, value));
                            break;
                        }
                    }
                    let flow = match chosen {
                        Some((body, value)) => self.walk(body, &value, out)?,
                        None => self.walk(otherwise, dot, out)?,
                    };
                    self.vars.truncate(mark);
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
                Node::Range {
                    vars,
                    pipeline,
                    body,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let items = range_items(self.pipeline(pipeline, dot)?)?;

                    if items.is_empty() {
                        self.walk(otherwise, dot, out)?;
                    }
                    for (key, value) in items {
                        let scope = self.vars.len();
                        if let Some(vars) = vars {
                            if let Some(key_var) = &vars.key {
                                self.vars.push((key_var.clone(), key));
                            }
                            self.vars.push((vars.value.clone(), value.clone()));
                        }
                        let flow = self.walk(body, &value, out)?;
                        self.vars.truncate(scope);
                        if matches!(flow, Flow::Break) {
                            break;
                        }
                    }
                    self.vars.truncate(mark);
                }
                Node::Template { name, pipeline } => {
                    let data = match pipeline {
                        Some(pipeline) => self.pipeline(pipeline, dot)?,
                        None => Value::Nil,
                    };
                    out.push_str(&self.call_template(name, data)?);
                }
                Node::Break => return Ok(Flow::Break),
                Node::Continue => return Ok(Flow::Continue),
            }
        }
        Ok(Flow::Normal)
    }

    fn call_template(&mut self, name: &str, data: Value) -> Result<String> {
        if self.depth >= MAX_DEPTH {
            return Err(RenderError::RecursionLimit);
        }
        let body = self
            .locals
            .get(name)
            .or_else(|| self.engine.defines.get(name))
            .cloned()
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))?;

        self.nested(&body, data).map_err(|e| match e {
            RenderError::RecursionLimit => e,
            other => in_template(name, other),
        })
    }

    /// Evaluate `nodes` with a fresh variable scope rooted at `data`
    fn nested(&mut self, nodes: &[Node], data: Value) -> Result<String> {
        let saved = std::mem::replace(&mut self.vars, vec![(String::new(), data.clone())]);
        self.depth += 1;
        let mut out = String::new();
        let result = self.walk(nodes, &data, &mut out);
        self.depth -= 1;
        self.vars = saved;
        result.map(|_| out)
    }

    fn tpl(&mut self, source: &str, data: Value) -> Result<String> {
        if self.depth >= MAX_DEPTH {
            return Err(RenderError::RecursionLimit);
        }
        let template = parser::parse(TPL_NAME, source)?;
        for (name, body) in template.defines {
            self.locals.insert(name, Rc::new(body));
        }
        self.nested(&template.nodes, data)
            .map_err(|e| in_template(TPL_NAME, e))
    }

    fn pipeline(&mut self, pipeline: &Pipeline, dot: &Value) -> Result<Value> {
        let mut piped = None;
        for command in &pipeline.commands {
            piped = Some(self.command(command, dot, piped.take())?);
        }
        let value = piped.unwrap_or_default();

        if let Some(decl) = &pipeline.decl {
            if decl.assign {
                let slot = self
                    .vars
                    .iter_mut()
                    .rev()
                    .find(|(name, _)| name == &decl.name)
                    .ok_or_else(|| undefined_variable(&decl.name))?;
                slot.1 = value.clone();
            } else {
                self.vars.push((decl.name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn command(&mut self, command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
        let Some((first, rest)) = command.operands.split_first() else {
            return Err(exec_error("empty command"));
        };

        match first {
            Operand::Identifier(name) => self.call_function(name, rest, dot, piped),
            Operand::Field(path) => {
                let args = self.args(rest, dot, piped)?;
                self.resolve(dot.clone(), path, args)
            }
            Operand::Variable { name, path } => {
                let base = self.variable(name)?;
                let args = self.args(rest, dot, piped)?;
                self.resolve(base, path, args)
            }
            Operand::Sub { pipeline, path } => {
                let base = self.pipeline(pipeline, dot)?;
                let args = self.args(rest, dot, piped)?;
                self.resolve(base, path, args)
            }
            Operand::Dot | Operand::Literal(_) => {
                if !rest.is_empty() || piped.is_some() {
                    return Err(non_function(first));
                }
                self.operand(first, dot)
            }
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        operands: &[Operand],
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value> {
        match name {
            "and" | "or" => {
                if operands.is_empty() && piped.is_none() {
                    return Err(RenderError::function(name, "missing arguments"));
                }
                let want = name == "or";
                let mut last = Value::Nil;
                for operand in operands {
                    last = self.operand(operand, dot)?;
                    if last.is_truthy() == want {
                        return Ok(last);
                    }
                }
                Ok(piped.unwrap_or(last))
            }
            "include" => {
                let args = self.args(operands, dot, piped)?;
                let template = args.first().map(Value::to_str).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or_default();
                self.call_template(&template, data)
                    .map(Value::String)
                    .map_err(|e| match e {
                        RenderError::RecursionLimit => e,
                        other => RenderError::function("include", other.to_string()),
                    })
            }
            "tpl" => {
                let args = self.args(operands, dot, piped)?;
                let source = args.first().map(Value::to_str).unwrap_or_default();
                let data = args.get(1).cloned().unwrap_or_default();
                self.tpl(&source, data)
                    .map(Value::String)
                    .map_err(|e| match e {
                        RenderError::RecursionLimit => e,
                        other => RenderError::function("tpl", other.to_string()),
                    })
            }
            _ => {
                let args = self.args(operands, dot, piped)?;
                functions::call(name, args)
            }
        }
    }

    fn args(&mut self, operands: &[Operand], dot: &Value, piped: Option<Value>) -> Result<Vec<Value>> {
        let mut args = operands
            .iter()
            .map(|operand| self.operand(operand, dot))
            .collect::<Result<Vec<_>>>()?;
        args.extend(piped);
        Ok(args)
    }

    fn operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => self.resolve(dot.clone(), path, Vec::new()),
            Operand::Variable { name, path } => {
                let base = self.variable(name)?;
                self.resolve(base, path, Vec::new())
            }
            Operand::Identifier(name) => self.call_function(name, &[], dot, None),
            Operand::Literal(literal) => Ok(match literal {
                Literal::String(s) => Value::String(s.clone()),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Nil => Value::Nil,
            }),
            Operand::Sub { pipeline, path } => {
                let base = self.pipeline(pipeline, dot)?;
                self.resolve(base, path, Vec::new())
            }
        }
    }

    fn variable(&self, name: &str) -> Result<Value> {
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| undefined_variable(name))
    }

    /// Walk a field path; the last segment may be a method taking `args`
    fn resolve(&self, base: Value, path: &[String], args: Vec<Value>) -> Result<Value> {
        let mut current = base;
        let mut consumed = args.is_empty();

        for (i, key) in path.iter().enumerate() {
            let last = i + 1 == path.len();
            let method_args: &[Value] = if last { &args } else { &[] };

            current = match &current {
                Value::Map(map) => map.borrow().get(key).cloned().unwrap_or_default(),
                Value::Files(files) => {
                    consumed |= last;
                    files.call(key, method_args)?
                }
                Value::ApiVersions(versions) if key == "Has" => {
                    consumed |= last;
                    let wanted = method_args.first().map(Value::to_str).unwrap_or_default();
                    Value::Bool(versions.iter().any(|v| v == &wanted))
                }
                Value::Nil => {
                    return Err(exec_error(format!(
                        "nil pointer evaluating interface {{}}.{}",
                        key
                    )));
                }
                other => {
                    return Err(exec_error(format!(
                        "can't evaluate field {} in type {}",
                        key,
                        other.type_name()
                    )));
                }
            };
        }

        if !consumed {
            let name = path.last().map(String::as_str).unwrap_or(".");
            return Err(exec_error(format!(
                "{} is not a method but has arguments",
                name
            )));
        }
        Ok(current)
    }
}

fn range_items(collection: Value) -> Result<Vec<(Value, Value)>> {
    Ok(match collection {
        Value::Nil => Vec::new(),
        Value::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), v))
            .collect(),
        Value::Map(map) => map
            .borrow()
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
        Value::Int(n) => (0..n).map(|i| (Value::Int(i), Value::Int(i))).collect(),
        Value::ApiVersions(versions) => versions
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::Int(i as i64), Value::String(v.clone())))
            .collect(),
        other => {
            return Err(exec_error(format!("range can't iterate over {}", other)));
        }
    })
}

/// Missing values print as nothing
fn printable(value: &Value) -> String {
    match value {
        Value::Nil => String::new(),
        other => other.to_string(),
    }
}

fn undefined_variable(name: &str) -> RenderError {
    exec_error(format!("undefined variable: ${}", name))
}

fn non_function(operand: &Operand) -> RenderError {
    let shown = match operand {
        Operand::Dot => ".".to_string(),
        Operand::Literal(literal) => format!("{:?}", literal),
        _ => "operand".to_string(),
    };
    exec_error(format!("can't give argument to non-function {}", shown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, data: serde_json::Value) -> String {
        Engine::render_str("test", source, &Value::from_json(&data)).unwrap()
    }

    fn render_err(source: &str, data: serde_json::Value) -> String {
        Engine::render_str("test", source, &Value::from_json(&data))
            .unwrap_err()
            .to_string()
    }

    #[test]
    fn test_fields_and_pipes() {
        let data = json!({"Values": {"image": {"repository": "nginx", "tag": "1.25"}}});
        assert_eq!(
            render(
                r#"image: {{ .Values.image.repository }}:{{ .Values.image.tag | default "latest" }}"#,
                data
            ),
            "image: nginx:1.25"
        );
    }

    #[test]
    fn test_missing_key_prints_nothing() {
        assert_eq!(render("[{{ .Values.missing }}]", json!({"Values": {}})), "[]");
    }

    #[test]
    fn test_field_on_nil_fails() {
        let err = render_err("{{ .Values.image.tag }}", json!({"Values": {}}));
        assert!(err.contains("nil pointer evaluating interface {}.tag"), "{}", err);
    }

    #[test]
    fn test_if_else_and_with() {
        let source = "{{ if .a }}A{{ else if .b }}B{{ else }}C{{ end }}|{{ with .c }}{{ .d }}{{ else }}none{{ end }}";
        assert_eq!(render(source, json!({"a": false, "b": true, "c": {"d": 1}})), "B|1");
        assert_eq!(render(source, json!({})), "C|none");
    }

    #[test]
    fn test_range_over_lists_and_maps() {
        let data = json!({"list": ["a", "b"], "map": {"y": 2, "x": 1}});
        assert_eq!(
            render("{{ range $i, $v := .list }}{{ $i }}={{ $v }} {{ end }}", data.clone()),
            "0=a 1=b "
        );
        assert_eq!(
            render("{{ range $k, $v := .map }}{{ $k }}:{{ $v }},{{ end }}", data.clone()),
            "x:1,y:2,"
        );
        assert_eq!(render("{{ range .empty }}x{{ else }}empty{{ end }}", data.clone()), "empty");
        assert_eq!(
            render("{{ range .list }}{{ if eq . \"b\" }}{{ break }}{{ end }}{{ . }}{{ end }}", data),
            "a"
        );
    }

    #[test]
    fn test_root_variable_inside_range() {
        let data = json!({"name": "app", "ports": [80, 443]});
        assert_eq!(
            render("{{ range .ports }}{{ $.name }}-{{ . }} {{ end }}", data),
            "app-80 app-443 "
        );
    }

    #[test]
    fn test_variables_declare_and_assign() {
        assert_eq!(
            render(
                "{{ $x := 1 }}{{ if true }}{{ $x = 2 }}{{ end }}{{ $x }}",
                json!({})
            ),
            "2"
        );
        let err = render_err("{{ $y = 1 }}", json!({}));
        assert!(err.contains("undefined variable"));
    }

    #[test]
    fn test_define_and_include() {
        let source = r#"{{- define "app.fullname" -}}{{ .Release.Name }}-{{ .Chart.Name }}{{- end -}}
name: {{ include "app.fullname" . | quote }}
other: {{ template "app.fullname" . }}"#;
        let data = json!({"Release": {"Name": "rel"}, "Chart": {"Name": "app"}});
        assert_eq!(render(source, data), "name: \"rel-app\"\nother: rel-app");
    }

    #[test]
    fn test_include_recursion_is_bounded() {
        let err = render_err(r#"{{ define "loop" }}{{ include "loop" . }}{{ end }}{{ include "loop" . }}"#, json!({}));
        assert!(err.contains("exceeded max template depth"), "{}", err);
    }

    #[test]
    fn test_tpl() {
        let data = json!({"Values": {"name": "web", "template": "{{ .Values.name }}-svc"}});
        assert_eq!(render("{{ tpl .Values.template . }}", data), "web-svc");
    }

    #[test]
    fn test_and_or_are_lazy() {
        assert_eq!(render("{{ or .a .b \"c\" }}", json!({"b": "B"})), "B");
        assert_eq!(render("{{ and .a .a.b }}", json!({})), "");
        assert_eq!(render("{{ if and .x .y }}yes{{ end }}", json!({"x": 1, "y": 2})), "yes");
    }

    #[test]
    fn test_dict_mutation_is_shared() {
        let source = r#"{{ $d := dict "a" 1 }}{{ $_ := set $d "b" 2 }}{{ $d | toJson }}"#;
        assert_eq!(render(source, json!({})), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_parenthesized_field_access() {
        let source = r#"{{ (dict "k" "v").k }}"#;
        assert_eq!(render(source, json!({})), "v");
    }

    #[test]
    fn test_fail_and_required() {
        let err = render_err(r#"{{ required "image.tag is required" .Values.tag }}"#, json!({"Values": {}}));
        assert!(err.contains("image.tag is required"));
        let err = render_err(r#"{{ fail "nope" }}"#, json!({}));
        assert!(err.contains("nope"));
    }

    #[test]
    fn test_argument_to_non_function() {
        let err = render_err("{{ . 1 }}", json!({}));
        assert!(err.contains("can't give argument to non-function"));
    }

    #[test]
    fn test_unknown_function() {
        let err = render_err("{{ nosuch 1 }}", json!({}));
        assert!(err.contains(r#"function "nosuch" not defined"#), "{}", err);
    }

    #[test]
    fn test_later_defines_override() {
        let mut engine = Engine::new();
        engine
            .add_template("a", r#"{{ define "x" }}first{{ end }}{{ template "x" }}"#)
            .unwrap();
        engine
            .add_template("b", r#"{{ define "x" }}second{{ end }}"#)
            .unwrap();
        assert_eq!(engine.render("a", &Value::Nil).unwrap(), "second");
        assert!(engine.has_template("b"));
        assert_eq!(engine.template_names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
