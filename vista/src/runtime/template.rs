//! Handlebars templates used to turn mark items into SVG.

use std::collections::HashMap;

use eyre::Result;
use handlebars::{
    html_escape, Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
};
use log::debug;
use serde::Serialize;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use subtle_encoding::hex;

use crate::{Config, Error};

const BUILTIN: &[(&str, &str)] = &[
    (
        "svg",
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{{num width}}" height="{{num height}}" viewBox="0 0 {{num width}} {{num height}}">"#,
            r#"{{#if background}}<rect width="100%" height="100%" fill="{{background}}"/>{{/if}}"#,
            r#"<g transform="translate({{num padding}},{{num padding}})">{{{body}}}</g></svg>"#,
        ),
    ),
    (
        "rect",
        r#"<rect x="{{num x}}" y="{{num y}}" width="{{num width}}" height="{{num height}}" fill="{{fill}}"/>"#,
    ),
    (
        "symbol",
        r#"<circle cx="{{num x}}" cy="{{num y}}" r="{{num size}}" fill="{{fill}}"/>"#,
    ),
    (
        "text",
        r#"<text x="{{num x}}" y="{{num y}}" fill="{{fill}}">{{text}}</text>"#,
    ),
];

/// A registry of named templates.
pub struct Templates {
    hb: Handlebars<'static>,
    // Maps template names -> content hashes.
    hashes: HashMap<String, String>,
}

impl std::fmt::Debug for Templates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Templates")
            .field("hashes", &self.hashes)
            .finish()
    }
}

impl Templates {
    /// An empty registry with the `num` helper available.
    pub fn new() -> Self {
        let mut hb = Handlebars::new();
        hb.register_helper("num", Box::new(num));
        Self {
            hb,
            hashes: HashMap::new(),
        }
    }

    /// The built-in mark templates, with any overrides found under the
    /// `templates` key of the given configuration taking precedence.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut templates = Self::new();
        match config.get("templates") {
            None => (),
            Some(JsonValue::Object(overrides)) => {
                for (name, template) in overrides {
                    let template = template
                        .as_str()
                        .ok_or_else(|| Error::InvalidConfigValue(format!("templates.{}", name)))?;
                    templates.register(name, template)?;
                }
            }
            Some(_) => return Err(Error::InvalidConfigValue("templates".to_string()).into()),
        }
        for (name, template) in BUILTIN {
            if !templates.has(name) {
                templates.register(name, template)?;
            }
        }
        Ok(templates)
    }

    /// Compiles the given template and adds it to the registry.
    ///
    /// Registering the same template under the same name twice is a no-op,
    /// but registering different content under an existing name is an
    /// error.
    pub fn register<N, T>(&mut self, name: N, template: T) -> Result<()>
    where
        N: AsRef<str>,
        T: AsRef<str>,
    {
        let name = name.as_ref();
        let template = template.as_ref();
        let hash = sha256(template);
        if let Some(existing) = self.hashes.get(name) {
            if existing == &hash {
                debug!("Already have template {} with hash {}, skipping", name, hash);
                return Ok(());
            }
            return Err(Error::TemplateAlreadyExists(name.to_string()).into());
        }
        self.hb
            .register_template_string(name, template)
            .map_err(|e| Error::TemplateParse(name.to_string(), e))?;
        debug!("Registered template {} with hash {}", name, hash);
        self.hashes.insert(name.to_string(), hash);
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.hb.has_template(name)
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        Ok(self
            .hb
            .render(name, data)
            .map_err(|e| Error::TemplateRender(name.to_string(), e))?)
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats a number for use in SVG attributes: rounded to two decimals,
/// without a trailing fractional part for whole numbers.
pub(crate) fn format_number(n: f64) -> String {
    let rounded = (n * 100.0).round() / 100.0;
    // Avoid printing "-0".
    if rounded == 0.0 {
        return "0".to_string();
    }
    rounded.to_string()
}

/// Writes a numeric parameter formatted for SVG.
///
/// Usage:
///
/// ```handlebars
/// {{num x}}
/// ```
///
/// Nulls render as nothing, strings are written escaped.
fn num(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h
        .param(0)
        .ok_or_else(|| RenderError::new("num: expected a single parameter"))?;
    match param.value() {
        JsonValue::Null => (),
        JsonValue::Number(n) => out.write(&format_number(n.as_f64().unwrap_or_default()))?,
        JsonValue::String(s) => out.write(&html_escape(s))?,
        other => out.write(&html_escape(&other.to_string()))?,
    }
    Ok(())
}

fn sha256(s: &str) -> String {
    let digest = Sha256::digest(s.as_bytes());
    String::from_utf8_lossy(&hex::encode(digest)).into_owned()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_numbers_for_attributes() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.33");
        assert_eq!(format_number(-0.001), "0");
    }

    #[test]
    fn renders_builtin_templates() {
        let templates = Templates::from_config(&Config::default()).unwrap();
        let out = templates
            .render(
                "symbol",
                &json!({"x": 1.0, "y": 2.25, "size": 3, "fill": "red"}),
            )
            .unwrap();
        assert_eq!(out, r#"<circle cx="1" cy="2.25" r="3" fill="red"/>"#);

        let out = templates
            .render("text", &json!({"x": 0, "y": 0, "fill": "black", "text": "a<b"}))
            .unwrap();
        assert_eq!(out, r#"<text x="0" y="0" fill="black">a&lt;b</text>"#);
    }

    #[test]
    fn config_overrides_builtin_templates() {
        let config = Config::default()
            .with("templates", json!({"symbol": "<dot {{num x}}/>"}))
            .unwrap();
        let templates = Templates::from_config(&config).unwrap();
        assert_eq!(
            templates.render("symbol", &json!({"x": 4})).unwrap(),
            "<dot 4/>"
        );
        assert!(templates.has("rect"));
    }

    #[test]
    fn rejects_non_string_overrides() {
        let config = Config::default()
            .with("templates", json!({"symbol": 3}))
            .unwrap();
        let err = Templates::from_config(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidConfigValue(k)) if k == "templates.symbol"
        ));
    }

    #[test]
    fn registration_is_deduplicated_by_content() {
        let mut templates = Templates::new();
        templates.register("a", "{{x}}").unwrap();
        templates.register("a", "{{x}}").unwrap();
        let err = templates.register("a", "{{y}}").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::TemplateAlreadyExists(n)) if n == "a"
        ));
        assert_eq!(templates.render("a", &json!({"x": "ok"})).unwrap(), "ok");
    }

    #[test]
    fn reports_template_parse_errors() {
        let mut templates = Templates::new();
        let err = templates.register("broken", "{{#if}}").unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::TemplateParse(..))));
        assert!(!templates.has("broken"));
    }
}
