//! Template rendering.
//!
//! Templates are plain text with `{{ ... }}` expressions evaluated against a
//! value tree:
//!
//! - `{{ .a.b }}` looks up a path, `{{ . }}` is the whole tree;
//! - `{{ .a | default "x" }}` pipes the value through functions, and
//!   `{{ default "x" .a }}` is the same call written prefix style;
//! - `{{- ` and ` -}}` trim the whitespace before or after the expression;
//! - `{{/* ... */}}` is a comment.
//!
//! Functions: `default`, `required`, `quote`, `upper`, `lower`, `trim`,
//! `toYaml`, `indent`, `nindent`. A path that resolves to nothing is an
//! error unless `default` handles it.

use regex::Regex;
use serde_json::Value;

use crate::error::{TemplateError, TemplateResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Literal(Value),
    Ident(String),
    Pipe,
}

/// An evaluated argument; `value` is `None` when a path resolved to nothing.
#[derive(Debug, Clone)]
struct Arg {
    value: Option<Value>,
    source: String,
}

/// Template renderer for `{{ ... }}` expressions.
pub struct TemplateRenderer {
    expression_pattern: Regex,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Create a new template renderer.
    pub fn new() -> Self {
        Self {
            // {{ expr }} with optional trim markers; lazy so adjacent
            // expressions do not merge.
            expression_pattern: Regex::new(r"(?s)\{\{(-)?\s*(.*?)\s*(-)?\}\}")
                .expect("expression pattern is valid"),
        }
    }

    /// Render `template` (named `name` in errors) against `values`.
    pub fn render(&self, name: &str, template: &str, values: &Value) -> TemplateResult<String> {
        let mut output = String::with_capacity(template.len());
        let mut last = 0;
        let mut trim_next = false;

        for caps in self.expression_pattern.captures_iter(template) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let mut text = &template[last..whole.start()];
            if trim_next {
                text = text.trim_start();
            }
            if caps.get(1).is_some() {
                text = text.trim_end();
            }
            output.push_str(text);

            let expression = caps.get(2).map_or("", |m| m.as_str());
            if !is_comment(expression) {
                output.push_str(&self.evaluate(name, expression, values)?);
            }

            trim_next = caps.get(3).is_some();
            last = whole.end();
        }

        let mut rest = &template[last..];
        if trim_next {
            rest = rest.trim_start();
        }
        output.push_str(rest);
        Ok(output)
    }

    fn evaluate(&self, name: &str, expression: &str, values: &Value) -> TemplateResult<String> {
        let syntax = |message: String| TemplateError::Syntax {
            template: name.to_string(),
            message,
        };

        let tokens = tokenize(expression).map_err(syntax)?;
        let stages: Vec<&[Token]> = tokens.split(|t| *t == Token::Pipe).collect();

        let mut piped: Option<Arg> = None;
        for stage in stages {
            let (head, rest) = stage
                .split_first()
                .ok_or_else(|| syntax(format!("empty pipeline stage in `{}`", expression)))?;

            piped = Some(match head {
                Token::Ident(function) => {
                    let mut args: Vec<Arg> = rest.iter().map(|t| resolve(t, values)).collect();
                    if let Some(input) = piped.take() {
                        args.push(input);
                    }
                    call(name, function, args)?
                }
                term if piped.is_none() && rest.is_empty() => resolve(term, values),
                _ => {
                    return Err(syntax(format!(
                        "expected a function name in `{}`",
                        expression
                    )))
                }
            });
        }

        let result = piped.ok_or_else(|| syntax("empty expression".to_string()))?;
        match result.value {
            Some(value) => Ok(to_text(&value)),
            None => Err(TemplateError::MissingVariable {
                template: name.to_string(),
                variable: result.source,
            }),
        }
    }
}

fn is_comment(expression: &str) -> bool {
    expression.starts_with("/*") && expression.ends_with("*/")
}

fn tokenize(expression: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '|' {
            chars.next();
            tokens.push(Token::Pipe);
        } else if c == '"' {
            chars.next();
            let mut literal = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some('n') => literal.push('\n'),
                        Some('t') => literal.push('\t'),
                        Some(other) => literal.push(other),
                        None => break,
                    },
                    other => literal.push(other),
                }
            }
            if !closed {
                return Err(format!("unterminated string in `{}`", expression));
            }
            tokens.push(Token::Literal(Value::String(literal)));
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '|' {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(classify(word));
        }
    }
    Ok(tokens)
}

fn classify(word: String) -> Token {
    if word.starts_with('.') {
        return Token::Path(word);
    }
    match word.as_str() {
        "true" => return Token::Literal(Value::Bool(true)),
        "false" => return Token::Literal(Value::Bool(false)),
        "nil" => return Token::Literal(Value::Null),
        _ => {}
    }
    if let Ok(n) = word.parse::<i64>() {
        return Token::Literal(Value::from(n));
    }
    if let Ok(f) = word.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Token::Literal(Value::Number(n));
        }
    }
    Token::Ident(word)
}

fn resolve(token: &Token, values: &Value) -> Arg {
    match token {
        Token::Path(path) => Arg {
            value: lookup(values, path).cloned(),
            source: path.clone(),
        },
        Token::Literal(value) => Arg {
            value: Some(value.clone()),
            source: to_text(value),
        },
        Token::Ident(word) => Arg {
            value: None,
            source: word.clone(),
        },
        Token::Pipe => Arg {
            value: None,
            source: "|".to_string(),
        },
    }
}

/// Walk a dotted path through maps (by key) and lists (by index).
fn lookup<'a>(values: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(values, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn call(template: &str, function: &str, mut args: Vec<Arg>) -> TemplateResult<Arg> {
    let arity = match function {
        "default" | "required" | "indent" | "nindent" => 2,
        "quote" | "upper" | "lower" | "trim" | "toYaml" => 1,
        _ => {
            return Err(TemplateError::Syntax {
                template: template.to_string(),
                message: format!("unknown function `{}`", function),
            })
        }
    };
    if args.len() != arity {
        return Err(TemplateError::Syntax {
            template: template.to_string(),
            message: format!(
                "`{}` takes {} argument(s), got {}",
                function,
                arity,
                args.len()
            ),
        });
    }

    let input = args.pop().unwrap_or(Arg {
        value: None,
        source: function.to_string(),
    });
    let parameter = args.pop();

    if function == "default" {
        let fallback = parameter.and_then(|p| p.value);
        let value = match input.value {
            Some(v) if !is_empty(&v) => Some(v),
            _ => fallback,
        };
        return Ok(Arg {
            value,
            source: input.source,
        });
    }

    if function == "required" {
        return match input.value {
            Some(v) if !v.is_null() => Ok(Arg {
                value: Some(v),
                source: input.source,
            }),
            _ => Err(TemplateError::Required {
                template: template.to_string(),
                message: parameter
                    .and_then(|p| p.value)
                    .map(|m| to_text(&m))
                    .unwrap_or(input.source),
            }),
        };
    }

    let Some(value) = input.value else {
        return Err(TemplateError::MissingVariable {
            template: template.to_string(),
            variable: input.source,
        });
    };

    let result = match function {
        "quote" => Value::String(Value::String(to_text(&value)).to_string()),
        "upper" => Value::String(to_text(&value).to_uppercase()),
        "lower" => Value::String(to_text(&value).to_lowercase()),
        "trim" => Value::String(to_text(&value).trim().to_string()),
        "toYaml" => {
            let yaml = serde_yaml::to_string(&value)?;
            Value::String(yaml.trim_end_matches('\n').to_string())
        }
        _ => {
            let width = parameter
                .and_then(|p| p.value)
                .and_then(|w| w.as_u64())
                .ok_or_else(|| TemplateError::Syntax {
                    template: template.to_string(),
                    message: format!("`{}` needs a numeric width", function),
                })?;
            let indented = indent(&to_text(&value), width as usize);
            if function == "nindent" {
                Value::String(format!("\n{}", indented))
            } else {
                Value::String(indented)
            }
        }
    };
    Ok(Arg {
        value: Some(result),
        source: input.source,
    })
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}
