//! Go template parser
//!
//! Parses Go/Helm template syntax with pest, applies the `{{-` / `-}}` trim
//! markers to the surrounding text and folds the actions into a tree.

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::*;
use crate::error::{RenderError, Result};

#[derive(Parser)]
#[grammar = "go_template.pest"]
struct GoTemplateParser;

/// A single action, before the tree is built
#[derive(Debug)]
enum Stmt {
    Comment,
    Output(Pipeline),
    If(Pipeline),
    ElseIf(Pipeline),
    ElseWith(Pipeline),
    Else,
    End,
    Range {
        vars: Option<RangeVars>,
        pipeline: Pipeline,
    },
    With(Pipeline),
    Define(String),
    Template {
        name: String,
        pipeline: Option<Pipeline>,
    },
    Block {
        name: String,
        pipeline: Pipeline,
    },
    Break,
    Continue,
}

impl Stmt {
    fn keyword(&self) -> &'static str {
        match self {
            Stmt::ElseIf(_) => "else if",
            Stmt::ElseWith(_) => "else with",
            Stmt::Else => "else",
            Stmt::End => "end",
            _ => "action",
        }
    }
}

enum Token {
    Text(String),
    Stmt(Stmt),
}

/// Parse a template source into a tree
pub fn parse(name: &str, source: &str) -> Result<Template> {
    let tokens = tokenize(name, source)?;
    let mut builder = TreeBuilder {
        name,
        tokens: tokens.into_iter(),
        defines: Vec::new(),
    };

    let (nodes, terminator) = builder.list()?;
    if let Some(stmt) = terminator {
        return Err(builder.error(format!("unexpected {{{{{}}}}}", stmt.keyword())));
    }

    Ok(Template {
        nodes,
        defines: builder.defines,
    })
}

fn tokenize(name: &str, source: &str) -> Result<Vec<Token>> {
    let mut pairs = GoTemplateParser::parse(Rule::template, source)
        .map_err(|e| RenderError::parse(name, e))?;

    let mut tokens = Vec::new();
    let mut trim_next = false;
    let Some(template) = pairs.next() else {
        return Ok(tokens);
    };

    for pair in template.into_inner() {
        match pair.as_rule() {
            Rule::raw_text => {
                let mut text = pair.as_str();
                if trim_next {
                    text = text.trim_start_matches(is_space);
                    trim_next = false;
                }
                tokens.push(Token::Text(text.to_string()));
            }
            Rule::action => {
                let mut trim_left = false;
                let mut body = None;
                for inner in pair.into_inner() {
                    match inner.as_rule() {
                        Rule::action_start => trim_left = inner.as_str().ends_with('-'),
                        Rule::action_end => trim_next = inner.as_str().starts_with('-'),
                        _ => body = Some(parse_stmt(name, inner)?),
                    }
                }

                if trim_left && let Some(Token::Text(text)) = tokens.last_mut() {
                    let trimmed = text.trim_end_matches(is_space).len();
                    text.truncate(trimmed);
                }

                let stmt = body.ok_or_else(|| RenderError::Parse {
                    template: name.to_string(),
                    message: "missing value for command".to_string(),
                })?;
                if !matches!(stmt, Stmt::Comment) {
                    tokens.push(Token::Stmt(stmt));
                }
            }
            _ => {}
        }
    }

    Ok(tokens)
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

struct TreeBuilder<'a> {
    name: &'a str,
    tokens: std::vec::IntoIter<Token>,
    defines: Vec<(String, Vec<Node>)>,
}

impl TreeBuilder<'_> {
    fn error(&self, message: impl Into<String>) -> RenderError {
        RenderError::Parse {
            template: self.name.to_string(),
            message: message.into(),
        }
    }

    /// Build nodes until a terminator (`end`, `else`, ...) or the end of input
    fn list(&mut self) -> Result<(Vec<Node>, Option<Stmt>)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.next() {
            let stmt = match token {
                Token::Text(text) => {
                    if !text.is_empty() {
                        nodes.push(Node::Text(text));
                    }
                    continue;
                }
                Token::Stmt(stmt) => stmt,
            };

            match stmt {
                Stmt::Output(pipeline) => nodes.push(Node::Output(pipeline)),
                Stmt::If(pipeline) => {
                    let (branches, otherwise) = self.branches(pipeline, false)?;
                    nodes.push(Node::If {
                        branches,
                        otherwise,
                    });
                }
                Stmt::With(pipeline) => {
                    let (branches, otherwise) = self.branches(pipeline, true)?;
                    nodes.push(Node::With {
                        branches,
                        otherwise,
                    });
                }
                Stmt::Range { vars, pipeline } => {
                    let (body, terminator) = self.list()?;
                    let otherwise = match terminator {
                        Some(Stmt::End) => Vec::new(),
                        Some(Stmt::Else) => self.until_end()?,
                        other => return Err(self.unterminated("range", other)),
                    };
                    nodes.push(Node::Range {
                        vars,
                        pipeline,
                        body,
                        otherwise,
                    });
                }
                Stmt::Define(name) => {
                    let body = self.until_end()?;
                    self.defines.push((name, body));
                }
                Stmt::Block { name, pipeline } => {
                    let body = self.until_end()?;
                    self.defines.push((name.clone(), body));
                    nodes.push(Node::Template {
                        name,
                        pipeline: Some(pipeline),
                    });
                }
                Stmt::Template { name, pipeline } => nodes.push(Node::Template { name, pipeline }),
                Stmt::Break => nodes.push(Node::Break),
                Stmt::Continue => nodes.push(Node::Continue),
                Stmt::Comment => {}
                terminator @ (Stmt::End | Stmt::Else | Stmt::ElseIf(_) | Stmt::ElseWith(_)) => {
                    return Ok((nodes, Some(terminator)));
                }
            }
        }

        Ok((nodes, None))
    }

    fn until_end(&mut self) -> Result<Vec<Node>> {
        match self.list()? {
            (body, Some(Stmt::End)) => Ok(body),
            (_, other) => Err(self.unterminated("define", other)),
        }
    }

    #[allow(clippy::type_complexity)]
    fn branches(
        &mut self,
        first: Pipeline,
        with: bool,
    ) -> Result<(Vec<(Pipeline, Vec<Node>)>, Vec<Node>)> {
        let keyword = if with { "with" } else { "if" };
        let mut branches = Vec::new();
        let mut condition = first;

        loop {
            let (body, terminator) = self.list()?;
            branches.push((condition, body));
            match terminator {
                Some(Stmt::End) => return Ok((branches, Vec::new())),
                Some(Stmt::Else) => return Ok((branches, self.until_end()?)),
                Some(Stmt::ElseIf(next)) if !with => condition = next,
                Some(Stmt::ElseWith(next)) if with => condition = next,
                other => return Err(self.unterminated(keyword, other)),
            }
        }
    }

    fn unterminated(&self, keyword: &str, found: Option<Stmt>) -> RenderError {
        match found {
            Some(stmt) => self.error(format!(
                "unexpected {{{{{}}}}} in {}",
                stmt.keyword(),
                keyword
            )),
            None => self.error(format!("unexpected EOF, missing {{{{end}}}} for {}", keyword)),
        }
    }
}

fn parse_stmt(name: &str, pair: Pair<Rule>) -> Result<Stmt> {
    let rule = pair.as_rule();
    let stmt = match rule {
        Rule::comment => Stmt::Comment,
        Rule::if_stmt => Stmt::If(inner_pipeline(name, pair)?),
        Rule::else_if_stmt => Stmt::ElseIf(inner_pipeline(name, pair)?),
        Rule::else_with_stmt => Stmt::ElseWith(inner_pipeline(name, pair)?),
        Rule::else_stmt => Stmt::Else,
        Rule::end_stmt => Stmt::End,
        Rule::with_stmt => Stmt::With(inner_pipeline(name, pair)?),
        Rule::break_stmt => Stmt::Break,
        Rule::continue_stmt => Stmt::Continue,
        Rule::range_stmt => {
            let mut vars = None;
            let mut pipeline = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::range_decl => {
                        let mut names: Vec<String> = inner
                            .into_inner()
                            .filter(|p| p.as_rule() == Rule::variable_name)
                            .map(|p| variable_name(p.as_str()))
                            .collect();
                        vars = match names.len() {
                            1 => Some(RangeVars {
                                key: None,
                                value: names.remove(0),
                            }),
                            2 => Some(RangeVars {
                                key: Some(names.remove(0)),
                                value: names.remove(0),
                            }),
                            _ => None,
                        };
                    }
                    Rule::pipeline => pipeline = Some(parse_pipeline(name, inner)?),
                    _ => {}
                }
            }
            Stmt::Range {
                vars,
                pipeline: pipeline.ok_or_else(|| missing(name, "range"))?,
            }
        }
        Rule::define_stmt | Rule::template_stmt | Rule::block_stmt => {
            let mut template_name = None;
            let mut pipeline = None;
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::string_lit => template_name = Some(unquote(inner.as_str())),
                    Rule::pipeline => pipeline = Some(parse_pipeline(name, inner)?),
                    _ => {}
                }
            }
            let template_name = template_name.ok_or_else(|| missing(name, "template name"))?;
            match rule {
                Rule::define_stmt => Stmt::Define(template_name),
                Rule::template_stmt => Stmt::Template {
                    name: template_name,
                    pipeline,
                },
                _ => Stmt::Block {
                    name: template_name,
                    pipeline: pipeline.ok_or_else(|| missing(name, "block"))?,
                },
            }
        }
        Rule::pipeline => Stmt::Output(parse_pipeline(name, pair)?),
        other => {
            return Err(RenderError::Parse {
                template: name.to_string(),
                message: format!("unexpected {:?}", other),
            });
        }
    };
    Ok(stmt)
}

fn missing(name: &str, what: &str) -> RenderError {
    RenderError::Parse {
        template: name.to_string(),
        message: format!("missing pipeline in {}", what),
    }
}

fn inner_pipeline(name: &str, pair: Pair<Rule>) -> Result<Pipeline> {
    let what = format!("{:?}", pair.as_rule());
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::pipeline)
        .map(|p| parse_pipeline(name, p))
        .unwrap_or_else(|| Err(missing(name, &what)))
}

fn parse_pipeline(name: &str, pair: Pair<Rule>) -> Result<Pipeline> {
    let mut decl = None;
    let mut commands = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::decl => {
                let mut var = String::new();
                let mut assign = false;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::variable_name => var = variable_name(part.as_str()),
                        Rule::decl_op => assign = part.as_str() == "=",
                        _ => {}
                    }
                }
                decl = Some(Decl { name: var, assign });
            }
            Rule::command => {
                let operands = inner
                    .into_inner()
                    .map(|p| parse_operand(name, p))
                    .collect::<Result<Vec<_>>>()?;
                commands.push(Command { operands });
            }
            _ => {}
        }
    }

    Ok(Pipeline { decl, commands })
}

fn parse_operand(name: &str, pair: Pair<Rule>) -> Result<Operand> {
    let text = pair.as_str();
    let operand = match pair.as_rule() {
        Rule::dot => Operand::Dot,
        Rule::field_chain => Operand::Field(split_path(text)),
        Rule::variable_path => {
            let rest = &text[1..];
            let (var, path) = match rest.split_once('.') {
                Some((var, path)) => (var, split_path(path)),
                None => (rest, Vec::new()),
            };
            Operand::Variable {
                name: var.to_string(),
                path,
            }
        }
        Rule::identifier => Operand::Identifier(text.to_string()),
        Rule::string_lit => Operand::Literal(Literal::String(unquote(text))),
        Rule::raw_string => Operand::Literal(Literal::String(text[1..text.len() - 1].to_string())),
        Rule::char_lit => {
            let c = unquote(&format!("\"{}\"", &text[1..text.len() - 1]))
                .chars()
                .next()
                .unwrap_or_default();
            Operand::Literal(Literal::Int(c as i64))
        }
        Rule::number => Operand::Literal(parse_number(name, text)?),
        Rule::boolean => Operand::Literal(Literal::Bool(text == "true")),
        Rule::nil => Operand::Literal(Literal::Nil),
        Rule::sub_pipeline => {
            let mut pipeline = None;
            let mut path = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::paren_inner => {
                        if let Some(p) = inner.into_inner().next() {
                            pipeline = Some(parse_pipeline(name, p)?);
                        }
                    }
                    Rule::field_suffix => path = split_path(inner.as_str()),
                    _ => {}
                }
            }
            Operand::Sub {
                pipeline: Box::new(pipeline.ok_or_else(|| missing(name, "parenthesized pipeline"))?),
                path,
            }
        }
        other => {
            return Err(RenderError::Parse {
                template: name.to_string(),
                message: format!("unexpected operand {:?}", other),
            });
        }
    };
    Ok(operand)
}

fn parse_number(name: &str, text: &str) -> Result<Literal> {
    let invalid = || RenderError::Parse {
        template: name.to_string(),
        message: format!("invalid number: {}", text),
    };

    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let n = i64::from_str_radix(hex, 16).map_err(|_| invalid())?;
        return Ok(Literal::Int(if negative { -n } else { n }));
    }
    if !digits.contains(['.', 'e', 'E'])
        && let Ok(n) = text.trim_start_matches('+').parse::<i64>()
    {
        return Ok(Literal::Int(n));
    }
    text.trim_start_matches('+')
        .parse::<f64>()
        .map(Literal::Float)
        .map_err(|_| invalid())
}

fn split_path(text: &str) -> Vec<String> {
    text.split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn variable_name(text: &str) -> String {
    text.trim_start_matches('$').to_string()
}

/// Remove quotes from an interpreted string literal and process escapes
fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text);

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(ch) => result.push(ch),
                    None => {
                        result.push_str("\\u");
                        result.push_str(&code);
                    }
                }
            }
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(source: &str) -> Vec<Node> {
        parse("test", source).unwrap().nodes
    }

    fn field(path: &[&str]) -> Operand {
        Operand::Field(path.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_parse_text_and_field() {
        let nodes = nodes("image: {{ .Values.image }}");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0], Node::Text("image: ".to_string()));
        assert_eq!(
            nodes[1],
            Node::Output(Pipeline {
                decl: None,
                commands: vec![Command {
                    operands: vec![field(&["Values", "image"])]
                }],
            })
        );
    }

    #[test]
    fn test_trim_markers() {
        let nodes = nodes("a  \n  {{- .x -}}  \n  b");
        assert_eq!(nodes[0], Node::Text("a".to_string()));
        assert_eq!(nodes[2], Node::Text("b".to_string()));
    }

    #[test]
    fn test_trim_requires_space() {
        let nodes = nodes("a {{-3}}");
        assert_eq!(nodes[0], Node::Text("a ".to_string()));
        let Node::Output(pipeline) = &nodes[1] else {
            panic!("expected output");
        };
        assert_eq!(
            pipeline.commands[0].operands[0],
            Operand::Literal(Literal::Int(-3))
        );
    }

    #[test]
    fn test_if_else_chain() {
        let nodes = nodes("{{ if .a }}A{{ else if .b }}B{{ else }}C{{ end }}");
        let Node::If {
            branches,
            otherwise,
        } = &nodes[0]
        else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].1, vec![Node::Text("B".to_string())]);
        assert_eq!(otherwise, &vec![Node::Text("C".to_string())]);
    }

    #[test]
    fn test_range_with_vars() {
        let nodes = nodes("{{ range $i, $v := .Values.list }}{{ $v }}{{ else }}none{{ end }}");
        let Node::Range {
            vars, otherwise, ..
        } = &nodes[0]
        else {
            panic!("expected range");
        };
        let vars = vars.as_ref().unwrap();
        assert_eq!(vars.key.as_deref(), Some("i"));
        assert_eq!(vars.value, "v");
        assert_eq!(otherwise.len(), 1);
    }

    #[test]
    fn test_define_and_template() {
        let template = parse(
            "test",
            r#"{{- define "app.name" -}}{{ .Chart.Name }}{{- end }}{{ template "app.name" . }}"#,
        )
        .unwrap();
        assert_eq!(template.defines.len(), 1);
        assert_eq!(template.defines[0].0, "app.name");
        assert!(matches!(&template.nodes[0], Node::Template { name, .. } if name == "app.name"));
    }

    #[test]
    fn test_pipeline_with_decl_and_parens() {
        let nodes = nodes(r#"{{ $name := (include "x" .).foo | default "y" | quote }}"#);
        let Node::Output(pipeline) = &nodes[0] else {
            panic!("expected output");
        };
        assert_eq!(
            pipeline.decl,
            Some(Decl {
                name: "name".to_string(),
                assign: false
            })
        );
        assert_eq!(pipeline.commands.len(), 3);
        assert!(matches!(
            &pipeline.commands[0].operands[0],
            Operand::Sub { path, .. } if path == &vec!["foo".to_string()]
        ));
    }

    #[test]
    fn test_variables_and_literals() {
        let nodes = nodes(r#"{{ printf "%s\n" $.Values.a $x 1.5 0x10 true nil 'a' `raw` }}"#);
        let Node::Output(pipeline) = &nodes[0] else {
            panic!("expected output");
        };
        let ops = &pipeline.commands[0].operands;
        assert_eq!(ops[0], Operand::Identifier("printf".to_string()));
        assert_eq!(ops[1], Operand::Literal(Literal::String("%s\n".to_string())));
        assert_eq!(
            ops[2],
            Operand::Variable {
                name: String::new(),
                path: vec!["Values".to_string(), "a".to_string()]
            }
        );
        assert_eq!(
            ops[3],
            Operand::Variable {
                name: "x".to_string(),
                path: vec![]
            }
        );
        assert_eq!(ops[4], Operand::Literal(Literal::Float(1.5)));
        assert_eq!(ops[5], Operand::Literal(Literal::Int(16)));
        assert_eq!(ops[6], Operand::Literal(Literal::Bool(true)));
        assert_eq!(ops[7], Operand::Literal(Literal::Nil));
        assert_eq!(ops[8], Operand::Literal(Literal::Int(97)));
        assert_eq!(ops[9], Operand::Literal(Literal::String("raw".to_string())));
    }

    #[test]
    fn test_comments_are_dropped() {
        let nodes = nodes("a\n{{- /* comment */ -}}\nb");
        assert_eq!(
            nodes,
            vec![Node::Text("a".to_string()), Node::Text("b".to_string())]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let nodes = nodes("{{ endpoint }}");
        let Node::Output(pipeline) = &nodes[0] else {
            panic!("expected output");
        };
        assert_eq!(
            pipeline.commands[0].operands[0],
            Operand::Identifier("endpoint".to_string())
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse("t", "{{ if .a }}never closed").is_err());
        assert!(parse("t", "{{ end }}").is_err());
        assert!(parse("t", "{{ .a ").is_err());
        assert!(parse("t", "{{ }}").is_err());
    }
}
