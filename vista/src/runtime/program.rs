//! Executable programs built from low-level documents.

use eyre::Result;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{Error, Map};

/// A dataset declared by a program. Its rows come from the inline `values`,
/// from the content found at `url`, or from the application's data bundle.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DataDef {
    pub name: String,
    #[serde(default)]
    pub values: Option<Vec<JsonValue>>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ScaleKind {
    #[default]
    Linear,
    Band,
}

/// The screen dimension a scale maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Extent {
    Width,
    Height,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DomainRef {
    pub data: String,
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScaleDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ScaleKind,
    pub domain: DomainRef,
    pub range: Extent,
    /// Linear scales only: include zero in the domain.
    #[serde(default)]
    pub zero: bool,
    /// Band scales only: fraction of each step left empty.
    #[serde(default)]
    pub padding: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MarkKind {
    Rect,
    Symbol,
    Text,
}

impl MarkKind {
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::Rect => "rect",
            Self::Symbol => "symbol",
            Self::Text => "text",
        }
    }
}

impl std::str::FromStr for MarkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rect" => Ok(Self::Rect),
            "symbol" => Ok(Self::Symbol),
            "text" => Ok(Self::Text),
            _ => Err(Error::UnknownMark(s.to_string())),
        }
    }
}

/// How a single visual property of a mark is computed from a row.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Channel {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub scale: Option<String>,
    /// Fraction of the scale's band width to add.
    #[serde(default)]
    pub band: Option<f64>,
    #[serde(default)]
    pub offset: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct FromRef {
    data: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MarkDef {
    #[serde(rename = "type")]
    kind: String,
    from: FromRef,
    #[serde(default)]
    encode: Map<String, Channel>,
}

#[derive(Debug, Clone)]
pub(crate) struct Mark {
    pub kind: MarkKind,
    pub from: String,
    pub encode: Map<String, Channel>,
}

#[derive(Debug, Clone, Deserialize)]
struct Document {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    background: Option<String>,
    #[serde(default)]
    data: Vec<DataDef>,
    #[serde(default)]
    scales: Vec<ScaleDef>,
    #[serde(default)]
    marks: Vec<MarkDef>,
}

/// A validated low-level document, ready to be executed by a view.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
    pub(crate) background: Option<String>,
    pub(crate) data: Vec<DataDef>,
    pub(crate) scales: Vec<ScaleDef>,
    pub(crate) marks: Vec<Mark>,
}

impl Program {
    /// Build a program from a low-level document, checking that its marks
    /// are supported and only refer to declared scales.
    pub fn from_document(doc: JsonValue) -> Result<Self> {
        let doc: Document =
            serde_json::from_value(doc).map_err(|e| Error::SpecCompile(e.to_string()))?;
        let marks = doc
            .marks
            .into_iter()
            .map(|def| {
                let kind = def.kind.parse::<MarkKind>()?;
                for channel in def.encode.values() {
                    if let Some(scale) = &channel.scale {
                        if !doc.scales.iter().any(|s| &s.name == scale) {
                            return Err(Error::UnknownScale(scale.clone()));
                        }
                    }
                }
                Ok(Mark {
                    kind,
                    from: def.from.data,
                    encode: def.encode,
                })
            })
            .collect::<Result<Vec<Mark>, Error>>()?;
        Ok(Self {
            width: doc.width,
            height: doc.height,
            background: doc.background,
            data: doc.data,
            scales: doc.scales,
            marks,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_program() {
        let program = Program::from_document(json!({
            "width": 300,
            "data": [{"name": "table"}, {"name": "live", "url": "select 1"}],
            "scales": [{
                "name": "x",
                "type": "band",
                "domain": {"data": "table", "field": "k"},
                "range": "width",
                "padding": 0.2
            }],
            "marks": [{
                "type": "rect",
                "from": {"data": "table"},
                "encode": {"x": {"scale": "x", "field": "k"}, "width": {"scale": "x", "band": 1}}
            }]
        }))
        .unwrap();
        assert_eq!(program.width, Some(300));
        assert_eq!(program.height, None);
        assert_eq!(program.data.len(), 2);
        assert_eq!(program.data[1].url.as_deref(), Some("select 1"));
        assert_eq!(program.scales[0].kind, ScaleKind::Band);
        assert_eq!(program.scales[0].range, Extent::Width);
        assert_eq!(program.marks[0].kind, MarkKind::Rect);
        assert_eq!(program.marks[0].encode["width"].band, Some(1.0));
    }

    #[test]
    fn rejects_unknown_marks() {
        let err = Program::from_document(json!({
            "marks": [{"type": "arc", "from": {"data": "table"}}]
        }))
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownMark(m)) if m == "arc"));
    }

    #[test]
    fn rejects_undeclared_scales() {
        let err = Program::from_document(json!({
            "marks": [{
                "type": "symbol",
                "from": {"data": "table"},
                "encode": {"x": {"scale": "x", "field": "a"}}
            }]
        }))
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownScale(s)) if s == "x"));
    }

    #[test]
    fn rejects_malformed_documents() {
        let err = Program::from_document(json!({"marks": "none"})).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::SpecCompile(_))));
    }
}
