//! Command template rendering.

use crate::errors::ScopeError;

/// Substitutes `{name}` placeholders in every token of `template`.
///
/// # Errors
///
/// Fails if the template is empty or a token references a placeholder not
/// present in `vars`.
pub fn render_template(template: &[String], vars: &[(&str, &str)]) -> Result<Vec<String>, ScopeError> {
    if template.is_empty() {
        return Err(ScopeError::Template {
            template: Vec::new(),
            reason: "template is empty".to_string(),
        });
    }

    template
        .iter()
        .map(|token| render_token(token, vars).map_err(|reason| ScopeError::Template {
            template: template.to_vec(),
            reason,
        }))
        .collect()
}

fn render_token(token: &str, vars: &[(&str, &str)]) -> Result<String, String> {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| format!("unclosed placeholder in '{token}'"))?;
        let name = &after[..close];
        let value = vars
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| format!("unknown placeholder '{{{name}}}'"))?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
