// Copyright 2026 rengine Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The sink data-template language: text substitution over the output tuple
//! (or tuple list in batch mode), with `{{.field}}` lookups, `range`/`if`
//! directives, `$var` bindings and the functions `json`, `index` and `add`.

use std::collections::HashMap;

use rengine_common::Value;

pub type TemplateResult<T> = std::result::Result<T, String>;

#[derive(Debug, Clone)]
enum TExpr {
    /// `.` / `.a.b` — path from the current dot value.
    Dot(Vec<String>),
    /// `$v` / `$v.a.b` — path from a range variable.
    Var(String, Vec<String>),
    Int(i64),
    Str(String),
    Call(String, Vec<TExpr>),
}

#[derive(Debug, Clone)]
enum TNode {
    Text(String),
    Output(TExpr),
    Range {
        index_var: Option<String>,
        elem_var: Option<String>,
        over: TExpr,
        body: Vec<TNode>,
    },
    If {
        cond: TExpr,
        body: Vec<TNode>,
    },
}

/// A compiled data template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<TNode>,
}

impl Template {
    pub fn compile(source: &str) -> TemplateResult<Template> {
        let segments = segment(source)?;
        let mut iter = segments.into_iter().peekable();
        let nodes = parse_nodes(&mut iter, false)?;
        Ok(Template { nodes })
    }

    /// Render against the output tuple (single mode) or tuple list (batch
    /// mode).
    pub fn render(&self, dot: &Value) -> TemplateResult<String> {
        let mut out = String::new();
        let mut vars = HashMap::new();
        render_nodes(&self.nodes, dot, &mut vars, &mut out)?;
        Ok(out)
    }
}

enum Segment {
    Text(String),
    Action(String),
}

fn segment(source: &str) -> TemplateResult<Vec<Segment>> {
    let mut out = vec![];
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            out.push(Segment::Text(rest[..start].to_owned()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| "unterminated {{ action".to_owned())?;
        out.push(Segment::Action(after[..end].trim().to_owned()));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest.to_owned()));
    }
    Ok(out)
}

fn parse_nodes(
    iter: &mut std::iter::Peekable<std::vec::IntoIter<Segment>>,
    in_block: bool,
) -> TemplateResult<Vec<TNode>> {
    let mut nodes = vec![];
    while let Some(segment) = iter.next() {
        match segment {
            Segment::Text(t) => nodes.push(TNode::Text(t)),
            Segment::Action(action) => {
                if action == "end" {
                    if in_block {
                        return Ok(nodes);
                    }
                    return Err("unexpected {{end}}".into());
                }
                if let Some(rest) = action.strip_prefix("range ") {
                    let (index_var, elem_var, over) = parse_range_header(rest)?;
                    let body = parse_nodes(iter, true)?;
                    nodes.push(TNode::Range {
                        index_var,
                        elem_var,
                        over,
                        body,
                    });
                } else if let Some(rest) = action.strip_prefix("if ") {
                    let cond = parse_expr(rest)?;
                    let body = parse_nodes(iter, true)?;
                    nodes.push(TNode::If { cond, body });
                } else {
                    nodes.push(TNode::Output(parse_expr(&action)?));
                }
            }
        }
    }
    if in_block {
        return Err("missing {{end}}".into());
    }
    Ok(nodes)
}

/// `$i, $e := EXPR` | `$e := EXPR` | `EXPR`
fn parse_range_header(
    header: &str,
) -> TemplateResult<(Option<String>, Option<String>, TExpr)> {
    match header.split_once(":=") {
        Some((vars, over)) => {
            let names: Vec<&str> = vars.split(',').map(str::trim).collect();
            let var_name = |s: &str| -> TemplateResult<String> {
                s.strip_prefix('$')
                    .map(str::to_owned)
                    .ok_or_else(|| format!("expected a $variable in range, found {s}"))
            };
            match names.as_slice() {
                [elem] => Ok((None, Some(var_name(elem)?), parse_expr(over.trim())?)),
                [index, elem] => Ok((
                    Some(var_name(index)?),
                    Some(var_name(elem)?),
                    parse_expr(over.trim())?,
                )),
                _ => Err(format!("bad range variables: {header}")),
            }
        }
        None => Ok((None, None, parse_expr(header)?)),
    }
}

fn tokenize_expr(src: &str) -> TemplateResult<Vec<String>> {
    let mut tokens = vec![];
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' => {
                chars.next();
                tokens.push(c.to_string());
            }
            '"' => {
                chars.next();
                let mut s = String::from('"');
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => s.push(c),
                        None => return Err("unterminated string in template".into()),
                    }
                }
                tokens.push(s);
            }
            _ => {
                let mut atom = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push(atom);
            }
        }
    }
    Ok(tokens)
}

fn parse_expr(src: &str) -> TemplateResult<TExpr> {
    let tokens = tokenize_expr(src)?;
    let mut pos = 0;
    let expr = parse_sequence(&tokens, &mut pos)?;
    if pos != tokens.len() {
        return Err(format!("trailing tokens in template expression: {src}"));
    }
    Ok(expr)
}

/// A sequence of terms; `name arg arg…` is a function application.
fn parse_sequence(tokens: &[String], pos: &mut usize) -> TemplateResult<TExpr> {
    let first = tokens
        .get(*pos)
        .ok_or_else(|| "empty template expression".to_owned())?;
    let is_func_name = !first.starts_with(['.', '$', '"', '('])
        && !first.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-');
    if is_func_name {
        let name = first.clone();
        *pos += 1;
        let mut args = vec![];
        while *pos < tokens.len() && tokens[*pos] != ")" {
            args.push(parse_term(tokens, pos)?);
        }
        return Ok(TExpr::Call(name, args));
    }
    let term = parse_term(tokens, pos)?;
    Ok(term)
}

fn parse_term(tokens: &[String], pos: &mut usize) -> TemplateResult<TExpr> {
    let tok = tokens
        .get(*pos)
        .ok_or_else(|| "unexpected end of template expression".to_owned())?;
    if tok == "(" {
        *pos += 1;
        let inner = parse_sequence(tokens, pos)?;
        if tokens.get(*pos).map(String::as_str) != Some(")") {
            return Err("missing ) in template expression".into());
        }
        *pos += 1;
        return Ok(inner);
    }
    *pos += 1;
    if let Some(s) = tok.strip_prefix('"') {
        return Ok(TExpr::Str(s.to_owned()));
    }
    if let Some(rest) = tok.strip_prefix('$') {
        let mut parts = rest.split('.');
        let name = parts.next().unwrap_or_default().to_owned();
        return Ok(TExpr::Var(name, parts.map(str::to_owned).collect()));
    }
    if tok == "." {
        return Ok(TExpr::Dot(vec![]));
    }
    if let Some(rest) = tok.strip_prefix('.') {
        return Ok(TExpr::Dot(rest.split('.').map(str::to_owned).collect()));
    }
    tok.parse::<i64>()
        .map(TExpr::Int)
        .map_err(|_| format!("bad template token {tok}"))
}

fn walk<'a>(mut value: &'a Value, path: &[String]) -> Value {
    for seg in path {
        match value {
            Value::Struct(m) => match m.get(seg) {
                Some(v) => value = v,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    value.clone()
}

fn eval_expr(
    expr: &TExpr,
    dot: &Value,
    vars: &HashMap<String, Value>,
) -> TemplateResult<Value> {
    match expr {
        TExpr::Dot(path) => Ok(walk(dot, path)),
        TExpr::Var(name, path) => {
            let base = vars
                .get(name)
                .ok_or_else(|| format!("undefined template variable ${name}"))?;
            Ok(walk(base, path))
        }
        TExpr::Int(i) => Ok(Value::Bigint(*i)),
        TExpr::Str(s) => Ok(Value::String(s.clone())),
        TExpr::Call(name, args) => {
            let args: Vec<Value> = args
                .iter()
                .map(|a| eval_expr(a, dot, vars))
                .collect::<TemplateResult<_>>()?;
            call_function(name, &args)
        }
    }
}

fn call_function(name: &str, args: &[Value]) -> TemplateResult<Value> {
    match name {
        "json" => {
            let v = args.first().ok_or("json expects one argument")?;
            serde_json::to_string(&v.to_json()).map(Value::String).map_err(|e| e.to_string())
        }
        "index" => {
            let mut current = args.first().ok_or("index expects a base value")?.clone();
            for key in &args[1..] {
                current = match (&current, key) {
                    (Value::Array(items), Value::Bigint(i)) => items
                        .get(*i as usize)
                        .cloned()
                        .ok_or_else(|| format!("index {i} out of range"))?,
                    (Value::Struct(m), Value::String(k)) => {
                        m.get(k).cloned().unwrap_or(Value::Null)
                    }
                    _ => {
                        return Err(format!(
                            "cannot index {} with {}",
                            current.type_name(),
                            key.type_name()
                        ))
                    }
                };
            }
            Ok(current)
        }
        "add" => {
            let (a, b) = match args {
                [a, b] => (a, b),
                _ => return Err("add expects two arguments".into()),
            };
            match (a, b) {
                (Value::Bigint(x), Value::Bigint(y)) => Ok(Value::Bigint(x + y)),
                _ => {
                    let x = a.as_f64().ok_or_else(|| {
                        format!("add expects numbers, found {}", a.type_name())
                    })?;
                    let y = b.as_f64().ok_or_else(|| {
                        format!("add expects numbers, found {}", b.type_name())
                    })?;
                    Ok(Value::Float(x + y))
                }
            }
        }
        other => Err(format!("unknown template function {other}")),
    }
}

fn render_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Bigint(i) => *i != 0,
        Value::Float(x) => *x != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Struct(m) => !m.is_empty(),
        Value::Bytes(b) => !b.is_empty(),
    }
}

fn render_nodes(
    nodes: &[TNode],
    dot: &Value,
    vars: &mut HashMap<String, Value>,
    out: &mut String,
) -> TemplateResult<()> {
    for node in nodes {
        match node {
            TNode::Text(t) => out.push_str(t),
            TNode::Output(expr) => {
                let v = eval_expr(expr, dot, vars)?;
                out.push_str(&render_value(&v));
            }
            TNode::Range {
                index_var,
                elem_var,
                over,
                body,
            } => {
                let value = eval_expr(over, dot, vars)?;
                let Value::Array(items) = value else {
                    return Err(format!("range over non-list {}", value.type_name()));
                };
                for (i, item) in items.into_iter().enumerate() {
                    if let Some(name) = index_var {
                        vars.insert(name.clone(), Value::Bigint(i as i64));
                    }
                    if let Some(name) = elem_var {
                        vars.insert(name.clone(), item.clone());
                    }
                    render_nodes(body, &item, vars, out)?;
                }
            }
            TNode::If { cond, body } => {
                if truthy(&eval_expr(cond, dot, vars)?) {
                    render_nodes(body, dot, vars, out)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(json: &str) -> Value {
        Value::from_json(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_single_tuple_substitution() {
        let t = Template::compile(r#"{"wrapper":"w1","c":"{{.color}}"}"#).unwrap();
        let out = t.render(&value(r#"{"color":"red","size":3}"#)).unwrap();
        assert_eq!(out, r#"{"wrapper":"w1","c":"red"}"#);
    }

    #[test]
    fn test_range_if_add() {
        let t = Template::compile(
            r#"[{{range $i,$e := .}}{{if $i}},{{end}}{"result":{{add $e.temperature $e.humidity}}}{{end}}]"#,
        )
        .unwrap();
        let out = t
            .render(&value(
                r#"[{"temperature":33,"humidity":70},{"temperature":22,"humidity":50},{"temperature":11,"humidity":90}]"#,
            ))
            .unwrap();
        assert_eq!(out, r#"[{"result":103},{"result":72},{"result":101}]"#);
    }

    #[test]
    fn test_json_and_index_functions() {
        let t = Template::compile(
            r#"{"content":{{json .}},"first":{{json (index . 0)}},"ab0":"{{index . 0 "ab"}}"}"#,
        )
        .unwrap();
        let out = t
            .render(&value(r#"[{"ab":"hello1"},{"ab":"hello2"}]"#))
            .unwrap();
        assert_eq!(
            out,
            r#"{"content":[{"ab":"hello1"},{"ab":"hello2"}],"first":{"ab":"hello1"},"ab0":"hello1"}"#
        );
    }

    #[test]
    fn test_range_body_rebinds_dot() {
        let t = Template::compile(r#"<ul>{{range .}}<li>{{.ab}}</li>{{end}}</ul>"#).unwrap();
        let out = t
            .render(&value(r#"[{"ab":"hello1"},{"ab":"hello2"}]"#))
            .unwrap();
        assert_eq!(out, "<ul><li>hello1</li><li>hello2</li></ul>");
    }

    #[test]
    fn test_float_sums_render_integral() {
        let t = Template::compile(r#"{{add .a .b}}"#).unwrap();
        let out = t.render(&value(r#"{"a":33.0,"b":70}"#)).unwrap();
        assert_eq!(out, "103");
    }

    #[test]
    fn test_compile_errors() {
        assert!(Template::compile("{{range .}}no end").is_err());
        assert!(Template::compile("{{end}}").is_err());
        assert!(Template::compile("{{unclosed").is_err());
    }
}
