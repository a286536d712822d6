//! Compiler from the high-level dialect down to the low-level one.

use eyre::Result;
use serde::Deserialize;
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use crate::dialect::SCHEMA;
use crate::{Error, Map};

const SOURCE: &str = "source";

#[derive(Debug, Deserialize)]
struct LiteSpec {
    #[serde(default)]
    data: Option<LiteData>,
    #[serde(default)]
    mark: Option<LiteMark>,
    #[serde(default)]
    encoding: Map<String, LiteChannel>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    background: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LiteData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    values: Option<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LiteMark {
    Name(String),
    Def {
        #[serde(rename = "type")]
        kind: String,
    },
}

#[derive(Debug, Deserialize)]
struct LiteChannel {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    value: Option<JsonValue>,
}

impl LiteChannel {
    fn encode(&self) -> JsonValue {
        match (&self.field, &self.value) {
            (Some(field), _) => json!({ "field": field }),
            (None, Some(value)) => json!({ "value": value }),
            (None, None) => json!({ "value": null }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteMarkKind {
    Point,
    Bar,
    Text,
}

impl LiteMarkKind {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "point" => Ok(Self::Point),
            "bar" => Ok(Self::Bar),
            "text" => Ok(Self::Text),
            _ => Err(Error::SpecCompile(format!("unsupported mark: {}", s)).into()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Bar => "bar",
            Self::Text => "text",
        }
    }
}

/// Compile a high-level document into an equivalent low-level one.
///
/// Point marks become symbols positioned by two linear scales, bars become
/// rects on a band scale rising from zero, and text marks become text
/// positioned by two linear scales.
pub fn compile_lite(doc: JsonValue) -> Result<JsonValue> {
    let spec: LiteSpec =
        serde_json::from_value(doc).map_err(|e| Error::SpecCompile(e.to_string()))?;
    let mark = match spec.mark {
        Some(LiteMark::Name(name)) | Some(LiteMark::Def { kind: name }) => {
            LiteMarkKind::parse(&name)?
        }
        None => return Err(Error::SpecCompile("missing mark".to_string()).into()),
    };
    let x = positional_field(&spec.encoding, mark, "x")?;
    let y = positional_field(&spec.encoding, mark, "y")?;

    let data = spec.data.unwrap_or_default();
    let source = data.name.clone().unwrap_or_else(|| SOURCE.to_string());
    let mut data_def = JsonMap::new();
    data_def.insert("name".to_string(), json!(source));
    if let Some(url) = data.url {
        data_def.insert("url".to_string(), json!(url));
    }
    if let Some(values) = data.values {
        data_def.insert("values".to_string(), json!(values));
    }

    let (x_scale, y_scale) = if mark == LiteMarkKind::Bar {
        (
            json!({
                "name": "x",
                "type": "band",
                "domain": {"data": source, "field": x},
                "range": "width",
                "padding": 0.1
            }),
            json!({
                "name": "y",
                "type": "linear",
                "domain": {"data": source, "field": y},
                "range": "height",
                "zero": true
            }),
        )
    } else {
        (
            json!({
                "name": "x",
                "type": "linear",
                "domain": {"data": source, "field": x},
                "range": "width"
            }),
            json!({
                "name": "y",
                "type": "linear",
                "domain": {"data": source, "field": y},
                "range": "height"
            }),
        )
    };

    let mut encode = JsonMap::new();
    encode.insert("x".to_string(), json!({"scale": "x", "field": x}));
    encode.insert("y".to_string(), json!({"scale": "y", "field": y}));
    let kind = match mark {
        LiteMarkKind::Point => "symbol",
        LiteMarkKind::Bar => {
            encode.insert("width".to_string(), json!({"scale": "x", "band": 1}));
            encode.insert("y2".to_string(), json!({"scale": "y", "value": 0}));
            "rect"
        }
        LiteMarkKind::Text => {
            let text = spec.encoding.get("text").ok_or_else(|| {
                Error::SpecCompile("text mark requires a text encoding".to_string())
            })?;
            encode.insert("text".to_string(), text.encode());
            "text"
        }
    };
    if let Some(color) = spec.encoding.get("color") {
        encode.insert("fill".to_string(), color.encode());
    }
    if let Some(size) = spec.encoding.get("size") {
        encode.insert("size".to_string(), size.encode());
    }

    let mut out = JsonMap::new();
    out.insert("$schema".to_string(), json!(SCHEMA));
    if let Some(width) = spec.width {
        out.insert("width".to_string(), json!(width));
    }
    if let Some(height) = spec.height {
        out.insert("height".to_string(), json!(height));
    }
    if let Some(background) = spec.background {
        out.insert("background".to_string(), json!(background));
    }
    out.insert("data".to_string(), json!([data_def]));
    out.insert("scales".to_string(), json!([x_scale, y_scale]));
    out.insert(
        "marks".to_string(),
        json!([{"type": kind, "from": {"data": source}, "encode": encode}]),
    );
    Ok(JsonValue::Object(out))
}

fn positional_field<'a>(
    encoding: &'a Map<String, LiteChannel>,
    mark: LiteMarkKind,
    channel: &str,
) -> Result<&'a str> {
    encoding
        .get(channel)
        .and_then(|c| c.field.as_deref())
        .ok_or_else(|| {
            Error::SpecCompile(format!(
                "{} mark requires a field for the {} channel",
                mark.name(),
                channel
            ))
            .into()
        })
}
