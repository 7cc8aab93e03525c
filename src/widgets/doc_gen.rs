//! Template filling for the document-generation widget.
//!
//! Templates use `{name}` placeholders with `{{` and `}}` as literal
//! braces. A placeholder may reach into nested values with `.key` or
//! `[index]`. Anything after `!` or `:` inside a placeholder is accepted
//! and ignored.
//!
//! Filling never fails: a missing variable or a malformed template yields
//! the template unchanged.

use serde_json::{Map, Value};
use tracing::debug;

/// Fill `template` from `variables`, or return it untouched on any error.
pub fn render(template: &str, variables: &Map<String, Value>) -> String {
    match try_render(template, variables) {
        Ok(content) => content,
        Err(reason) => {
            debug!(%reason, "template left unfilled");
            template.to_string()
        }
    }
}

fn try_render(template: &str, variables: &Map<String, Value>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err("single '}' in template".to_string()),
            '{' => {
                let mut field = String::new();
                let mut depth = 0usize;
                loop {
                    match chars.next() {
                        Some('{') => {
                            depth += 1;
                            field.push('{');
                        }
                        Some('}') if depth == 0 => break,
                        Some('}') => {
                            depth -= 1;
                            field.push('}');
                        }
                        Some(ch) => field.push(ch),
                        None => return Err("unclosed '{' in template".to_string()),
                    }
                }
                out.push_str(&resolve_field(&field, variables)?);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

fn resolve_field(field: &str, variables: &Map<String, Value>) -> Result<String, String> {
    let path = field
        .split(|c| c == '!' || c == ':')
        .next()
        .unwrap_or_default();
    let name_end = path.find(|c| c == '.' || c == '[').unwrap_or(path.len());
    let name = &path[..name_end];
    if name.is_empty() {
        return Err("positional placeholder without arguments".to_string());
    }
    let mut value = variables
        .get(name)
        .ok_or_else(|| format!("missing variable '{}'", name))?;

    let mut rest = &path[name_end..];
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(|c| c == '.' || c == '[').unwrap_or(after.len());
            let key = &after[..end];
            value = value
                .get(key)
                .ok_or_else(|| format!("missing attribute '{}' in '{}'", key, field))?;
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after
                .find(']')
                .ok_or_else(|| format!("unterminated index in '{}'", field))?;
            let key = &after[..end];
            value = match key.parse::<usize>() {
                Ok(i) => value.get(i),
                Err(_) => value.get(key),
            }
            .ok_or_else(|| format!("missing index '{}' in '{}'", key, field))?;
            rest = &after[end + 1..];
        } else {
            return Err(format!("malformed placeholder '{}'", field));
        }
    }
    Ok(value_text(value))
}

/// Strings are inserted bare; other values as their JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn fills_placeholders() {
        let out = render(
            "Dear {name}, your offer is {salary} starting {start}.",
            &vars(json!({"name": "Ada", "salary": 120000, "start": "May 1"})),
        );
        assert_eq!(out, "Dear Ada, your offer is 120000 starting May 1.");
    }

    #[test]
    fn missing_variable_returns_template() {
        let template = "Hello {name}, welcome to {team}";
        assert_eq!(render(template, &vars(json!({"name": "Ada"}))), template);
    }

    #[test]
    fn malformed_template_returns_template() {
        assert_eq!(render("broken {name", &vars(json!({"name": "x"}))), "broken {name");
        assert_eq!(render("stray } brace", &Map::new()), "stray } brace");
        assert_eq!(render("positional {}", &Map::new()), "positional {}");
    }

    #[test]
    fn doubled_braces_are_literal() {
        let out = render("{{literal}} {x}", &vars(json!({"x": "y"})));
        assert_eq!(out, "{literal} y");
    }

    #[test]
    fn nested_lookup_and_ignored_format_spec() {
        let out = render(
            "{company.name} / {tags[1]} / {amount:>10}",
            &vars(json!({"company": {"name": "Curie"}, "tags": ["a", "b"], "amount": 5})),
        );
        assert_eq!(out, "Curie / b / 5");
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        assert_eq!(render("plain text", &Map::new()), "plain text");
    }
}
