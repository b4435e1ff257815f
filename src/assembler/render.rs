use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tera::{Context, Tera};

use super::variables::error_chain;

const RENDER_NAME: &str = "__render__";

/// Render template text against a serializable context.
///
/// Autoescaping is off: output is device configuration, not HTML.
pub fn render<C: Serialize>(template_text: &str, context: &C) -> Result<String, String> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    register_filters(&mut tera);
    tera.add_raw_template(RENDER_NAME, template_text)
        .map_err(|e| error_chain(&e))?;

    let context = Context::from_serialize(context).map_err(|e| error_chain(&e))?;
    tera.render(RENDER_NAME, &context)
        .map_err(|e| error_chain(&e))
}

fn register_filters(tera: &mut Tera) {
    tera.register_filter("md5_hash", md5_hash);
    tera.register_filter("des_hash", des_hash);
    tera.register_filter("sha512_hash", sha512_hash);
}

/// Password hash filters produce crypt(3) strings accepted by PAN-OS `phash`
fn md5_hash(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    hash_with(value, "md5_hash", |s| pwhash::md5_crypt::hash(s))
}

fn des_hash(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    hash_with(value, "des_hash", |s| pwhash::unix_crypt::hash(s))
}

fn sha512_hash(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    hash_with(value, "sha512_hash", |s| pwhash::sha512_crypt::hash(s))
}

fn hash_with<F, E>(value: &Value, filter: &str, hash: F) -> tera::Result<Value>
where
    F: Fn(&str) -> Result<String, E>,
    E: std::fmt::Display,
{
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(tera::Error::msg(format!(
                "Filter `{}` expects a string, got {}",
                filter, other
            )))
        }
    };
    hash(&text)
        .map(Value::String)
        .map_err(|e| tera::Error::msg(format!("Filter `{}` failed: {}", filter, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_variables() {
        let out = render("hostname={{ hostname }}", &json!({"hostname": "fw1"})).unwrap();
        assert_eq!(out, "hostname=fw1");
    }

    #[test]
    fn test_render_does_not_escape_markup() {
        let out = render("<hostname>{{ h }}</hostname>", &json!({"h": "a&b<c>"})).unwrap();
        assert_eq!(out, "<hostname>a&b<c></hostname>");
    }

    #[test]
    fn test_render_missing_variable_is_error() {
        assert!(render("{{ nope }}", &json!({})).is_err());
    }

    #[test]
    fn test_hash_filters() {
        let out = render("{{ pw | md5_hash }}", &json!({"pw": "admin"})).unwrap();
        assert!(out.starts_with("$1$"));

        let out = render("{{ pw | sha512_hash }}", &json!({"pw": "admin"})).unwrap();
        assert!(out.starts_with("$6$"));

        let out = render("{{ pw | des_hash }}", &json!({"pw": "admin"})).unwrap();
        assert_eq!(out.len(), 13);
    }
}
