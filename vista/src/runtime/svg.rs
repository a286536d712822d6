//! A runtime rendering programs to SVG documents.

use std::cell::RefCell;
use std::rc::Rc;

use eyre::{Result, WrapErr};
use futures_util::future::{FutureExt, LocalBoxFuture};
use log::{debug, warn};
use serde_json::{json, Map as JsonMap, Value as JsonValue};

use super::lite::compile_lite;
use super::program::{Channel, Mark, MarkKind, Program};
use super::scale::Scale;
use super::template::{format_number, Templates};
use super::{Runtime, RuntimeView};
use crate::{error_message, Config, Dataset, Error, Loader, Map, Surface};

const DEFAULT_SYMBOL_SIZE: f64 = 4.0;

const CONFIG_KEYS: &[&str] = &["width", "height", "background", "padding", "templates"];

/// Configured fallbacks for properties a program leaves unspecified.
#[derive(Debug, Clone, Default)]
struct Defaults {
    width: Option<u32>,
    height: Option<u32>,
    background: Option<String>,
    padding: u32,
}

/// Renders programs to SVG, drawing each mark item through a handlebars
/// template.
///
/// Recognized configuration keys are `width`, `height`, `background`,
/// `padding` and `templates` (an object of template overrides keyed by
/// mark type, or `svg` for the enclosing document).
#[derive(Debug, Clone)]
pub struct SvgRuntime {
    templates: Rc<Templates>,
    defaults: Rc<Defaults>,
}

impl SvgRuntime {
    pub fn new(config: &Config) -> Result<Self> {
        for (key, _) in config.iter() {
            if !CONFIG_KEYS.contains(&key.as_str()) {
                warn!("Ignoring unrecognized configuration key: {}", key);
            }
        }
        let defaults = Defaults {
            width: config.get_u32("width")?,
            height: config.get_u32("height")?,
            background: config.get_str("background")?.map(str::to_string),
            padding: config.get_u32("padding")?.unwrap_or(0),
        };
        debug!("Configured SVG runtime with {:?}", defaults);
        Ok(Self {
            templates: Rc::new(Templates::from_config(config)?),
            defaults: Rc::new(defaults),
        })
    }
}

impl Runtime for SvgRuntime {
    type Program = Program;
    type View = SvgView;

    fn compile_high_level(&self, doc: JsonValue) -> Result<JsonValue> {
        compile_lite(doc)
    }

    fn build_program(&self, doc: JsonValue) -> Result<Program> {
        Program::from_document(doc)
    }

    fn create_view(&self, program: Program, loader: Rc<dyn Loader>) -> SvgView {
        SvgView::new(program, self.templates.clone(), self.defaults.clone(), loader)
    }
}

/// A view drawing its program onto the surface it is attached to.
pub struct SvgView {
    state: Rc<RefCell<ViewState>>,
}

struct ViewState {
    program: Program,
    templates: Rc<Templates>,
    defaults: Rc<Defaults>,
    loader: Rc<dyn Loader>,
    target: Option<Surface>,
    datasets: Map<String, Dataset>,
    live: bool,
    finalized: bool,
}

impl SvgView {
    fn new(
        program: Program,
        templates: Rc<Templates>,
        defaults: Rc<Defaults>,
        loader: Rc<dyn Loader>,
    ) -> Self {
        let datasets = program
            .data
            .iter()
            .map(|d| {
                let rows = d.values.clone().unwrap_or_default();
                (d.name.clone(), Rc::new(rows))
            })
            .collect();
        Self {
            state: Rc::new(RefCell::new(ViewState {
                program,
                templates,
                defaults,
                loader,
                target: None,
                datasets,
                live: false,
                finalized: false,
            })),
        }
    }
}

impl RuntimeView for SvgView {
    fn attach(&mut self, target: &Surface) {
        self.state.borrow_mut().target = Some(target.clone());
    }

    fn load_dataset(&mut self, name: &str, rows: Dataset) {
        self.state
            .borrow_mut()
            .datasets
            .insert(name.to_string(), rows);
    }

    fn run(&mut self) -> LocalBoxFuture<'static, Result<()>> {
        execute(self.state.clone()).boxed_local()
    }

    fn resize(&mut self) {
        let state = self.state.borrow();
        if !state.live || state.finalized {
            return;
        }
        if let Err(e) = state.draw() {
            warn!("Failed to redraw view after resize: {}", error_message(&e));
        }
    }

    fn finalize(&mut self) {
        let mut state = self.state.borrow_mut();
        state.finalized = true;
        if let Some(target) = state.target.take() {
            if state.live {
                target.clear();
            }
        }
    }
}

/// Resolves the program's external datasets, then draws unless the view was
/// finalized in the meantime.
async fn execute(state: Rc<RefCell<ViewState>>) -> Result<()> {
    let (loader, sources) = {
        let state = state.borrow();
        let sources = state
            .program
            .data
            .iter()
            .filter_map(|d| d.url.clone().map(|url| (d.name.clone(), url)))
            .collect::<Vec<_>>();
        (state.loader.clone(), sources)
    };
    for (name, url) in sources {
        debug!("Loading dataset {} from {}", name, url);
        let text = loader
            .load(&url)
            .await
            .wrap_err_with(|| format!("failed to load dataset \"{}\"", name))?;
        let rows = parse_rows(&url, &text)?;
        state.borrow_mut().datasets.insert(name, Rc::new(rows));
    }
    let mut view = state.borrow_mut();
    if view.finalized {
        debug!("View was finalized while loading, not drawing");
        return Ok(());
    }
    view.draw()?;
    view.live = true;
    Ok(())
}

impl ViewState {
    fn dataset(&self, name: &str) -> Result<&Dataset> {
        self.datasets
            .get(name)
            .ok_or_else(|| Error::UnknownDataset(name.to_string()).into())
    }

    fn draw(&self) -> Result<()> {
        let target = match &self.target {
            Some(t) => t,
            None => return Ok(()),
        };
        let (surface_width, surface_height) = target.size();
        let width = self
            .program
            .width
            .or(self.defaults.width)
            .unwrap_or(surface_width) as f64;
        let height = self
            .program
            .height
            .or(self.defaults.height)
            .unwrap_or(surface_height) as f64;
        let padding = self.defaults.padding as f64;
        let inner_width = (width - 2.0 * padding).max(0.0);
        let inner_height = (height - 2.0 * padding).max(0.0);

        let mut scales = Map::new();
        for def in &self.program.scales {
            let rows = self.dataset(&def.domain.data)?;
            scales.insert(
                def.name.clone(),
                Scale::fit(def, rows, inner_width, inner_height),
            );
        }
        let mut body = String::new();
        for mark in &self.program.marks {
            let template = mark.kind.template_name();
            for row in self.dataset(&mark.from)?.iter() {
                let item = mark_item(mark, row, &scales)?;
                body.push_str(&self.templates.render(template, &item)?);
            }
        }
        let background = self
            .program
            .background
            .as_ref()
            .or(self.defaults.background.as_ref());
        let doc = self.templates.render(
            "svg",
            &json!({
                "width": width,
                "height": height,
                "background": background,
                "padding": padding,
                "body": body,
            }),
        )?;
        target.present(doc);
        Ok(())
    }
}

/// Interprets loaded text as the rows of a dataset. Empty text has no rows.
fn parse_rows(url: &str, text: &str) -> Result<Vec<JsonValue>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<JsonValue>(text).map_err(Error::Json)? {
        JsonValue::Array(rows) => Ok(rows),
        _ => Err(Error::NotAnArray(url.to_string()).into()),
    }
}

fn mark_item(
    mark: &Mark,
    row: &JsonValue,
    scales: &Map<String, Scale>,
) -> Result<JsonMap<String, JsonValue>> {
    let mut item = JsonMap::new();
    for (name, channel) in &mark.encode {
        item.insert(name.clone(), evaluate(channel, row, scales)?);
    }
    match mark.kind {
        MarkKind::Rect => {
            span(&mut item, "x", "x2", "width");
            span(&mut item, "y", "y2", "height");
        }
        MarkKind::Symbol => {
            item.entry("size").or_insert(json!(DEFAULT_SYMBOL_SIZE));
        }
        MarkKind::Text => {
            if let Some(n) = item.get("text").and_then(JsonValue::as_f64) {
                item.insert("text".to_string(), json!(format_number(n)));
            }
        }
    }
    let fill = if mark.kind == MarkKind::Text {
        "black"
    } else {
        "steelblue"
    };
    item.entry("fill").or_insert(json!(fill));
    Ok(item)
}

fn evaluate(channel: &Channel, row: &JsonValue, scales: &Map<String, Scale>) -> Result<JsonValue> {
    let base = match (&channel.field, &channel.value) {
        (Some(field), _) => row.get(field).cloned().unwrap_or(JsonValue::Null),
        (None, Some(value)) => value.clone(),
        (None, None) => JsonValue::Null,
    };
    let scale = match &channel.scale {
        Some(name) => scales
            .get(name)
            .ok_or_else(|| Error::UnknownScale(name.clone()))?,
        None => {
            return Ok(match base.as_f64() {
                Some(n) => json!(n + channel.offset),
                None => base,
            })
        }
    };
    let band = channel.band.map(|b| b * scale.bandwidth());
    let position = if base.is_null() {
        band
    } else {
        scale.apply(&base).map(|p| p + band.unwrap_or(0.0))
    };
    Ok(position
        .map(|p| json!(p + channel.offset))
        .unwrap_or(JsonValue::Null))
}

/// Replaces an end coordinate with a start and a non-negative extent.
fn span(item: &mut JsonMap<String, JsonValue>, start: &str, end: &str, extent: &str) {
    if let Some(stop) = item.remove(end).as_ref().and_then(JsonValue::as_f64) {
        let begin = item.get(start).and_then(JsonValue::as_f64).unwrap_or(0.0);
        item.insert(start.to_string(), json!(begin.min(stop)));
        item.insert(extent.to_string(), json!((stop - begin).abs()));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use async_trait::async_trait;

    use crate::{LoadOptions, Sanitized, UriKind};

    /// Answers every load with the same text.
    struct StaticLoader(String);

    #[async_trait(?Send)]
    impl Loader for StaticLoader {
        async fn load(&self, _uri: &str) -> Result<String> {
            Ok(self.0.clone())
        }

        async fn sanitize(&self, uri: &str, _options: &LoadOptions) -> Result<Sanitized> {
            Ok(Sanitized {
                href: uri.to_string(),
                kind: UriKind::File,
            })
        }

        async fn http(&self, _uri: &str, _options: &LoadOptions) -> Result<String> {
            Ok(self.0.clone())
        }

        async fn file(&self, _name: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn view(doc: JsonValue, loaded: &str, target: &Surface) -> SvgView {
        let runtime = SvgRuntime::new(&Config::default()).unwrap();
        let program = runtime.build_program(doc).unwrap();
        let mut view = runtime.create_view(program, Rc::new(StaticLoader(loaded.to_string())));
        view.attach(target);
        view
    }

    fn bar_chart() -> JsonValue {
        json!({
            "data": [{"name": "table"}],
            "scales": [
                {
                    "name": "x",
                    "type": "band",
                    "domain": {"data": "table", "field": "k"},
                    "range": "width"
                },
                {
                    "name": "y",
                    "domain": {"data": "table", "field": "v"},
                    "range": "height",
                    "zero": true
                }
            ],
            "marks": [{
                "type": "rect",
                "from": {"data": "table"},
                "encode": {
                    "x": {"scale": "x", "field": "k"},
                    "width": {"scale": "x", "band": 1},
                    "y": {"scale": "y", "field": "v"},
                    "y2": {"scale": "y", "value": 0}
                }
            }]
        })
    }

    #[tokio::test]
    async fn draws_bars_from_supplied_rows() {
        let surface = Surface::new(200, 100);
        let mut view = view(bar_chart(), "", &surface);
        view.load_dataset(
            "table",
            Rc::new(vec![json!({"k": "a", "v": 10}), json!({"k": "b", "v": 20})]),
        );
        view.run().await.unwrap();
        let content = surface.content();
        assert!(content.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100""#));
        assert!(content.contains(r#"<rect x="0" y="50" width="100" height="50" fill="steelblue"/>"#));
        assert!(content.contains(r#"<rect x="100" y="0" width="100" height="100" fill="steelblue"/>"#));
        assert_eq!(surface.presentations(), 1);
    }

    #[tokio::test]
    async fn loads_url_datasets_through_the_loader() {
        let surface = Surface::new(100, 100);
        let mut view = view(
            json!({
                "data": [{"name": "points", "url": "select x, y from t"}],
                "marks": [{
                    "type": "text",
                    "from": {"data": "points"},
                    "encode": {"x": {"field": "x", "offset": 2}, "y": {"field": "y"}, "text": {"field": "y"}}
                }]
            }),
            r#"[{"x": 1, "y": 2.5}]"#,
            &surface,
        );
        view.run().await.unwrap();
        assert!(surface
            .content()
            .contains(r#"<text x="3" y="2.5" fill="black">2.5</text>"#));
    }

    #[tokio::test]
    async fn rejects_non_array_data() {
        let surface = Surface::new(100, 100);
        let mut view = view(
            json!({"data": [{"name": "points", "url": "points.json"}]}),
            r#"{"x": 1}"#,
            &surface,
        );
        let err = view.run().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotAnArray(u)) if u == "points.json"));
        assert_eq!(surface.presentations(), 0);
    }

    #[tokio::test]
    async fn marks_from_undeclared_datasets_fail() {
        let surface = Surface::new(100, 100);
        let mut view = view(
            json!({"marks": [{"type": "symbol", "from": {"data": "missing"}}]}),
            "",
            &surface,
        );
        let err = view.run().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::UnknownDataset(d)) if d == "missing"));
    }

    #[tokio::test]
    async fn finalized_views_never_present() {
        let surface = Surface::new(100, 100);
        let mut view = view(json!({"data": [{"name": "t", "values": []}]}), "", &surface);
        let pending = view.run();
        view.finalize();
        pending.await.unwrap();
        assert_eq!(surface.presentations(), 0);
        view.resize();
        assert_eq!(surface.presentations(), 0);
    }

    #[tokio::test]
    async fn resize_redraws_at_the_current_size() {
        let surface = Surface::new(100, 100);
        let mut view = view(bar_chart(), "", &surface);
        view.load_dataset("table", Rc::new(vec![json!({"k": "a", "v": 1})]));

        // Nothing to redraw before the first run completes.
        view.resize();
        assert_eq!(surface.presentations(), 0);

        view.run().await.unwrap();
        assert!(surface.content().contains(r#"width="100" height="100""#));

        surface.set_size(300, 50);
        view.resize();
        assert_eq!(surface.presentations(), 2);
        assert!(surface
            .content()
            .contains(r#"<rect x="0" y="0" width="300" height="50" fill="steelblue"/>"#));

        view.finalize();
        assert!(surface.content().is_empty());
    }

    #[tokio::test]
    async fn configuration_supplies_defaults() {
        let config = Config::default()
            .with("width", 40)
            .unwrap()
            .with("background", "white")
            .unwrap()
            .with("padding", 5)
            .unwrap();
        let runtime = SvgRuntime::new(&config).unwrap();
        let program = runtime
            .build_program(json!({"height": 20, "data": [{"name": "t", "values": [{"x": 1}]}]}))
            .unwrap();
        let surface = Surface::new(100, 100);
        let mut view = runtime.create_view(program, Rc::new(StaticLoader(String::new())));
        view.attach(&surface);
        view.run().await.unwrap();
        let content = surface.content();
        assert!(content.contains(r#"width="40" height="20""#));
        assert!(content.contains(r#"<rect width="100%" height="100%" fill="white"/>"#));
        assert!(content.contains(r#"<g transform="translate(5,5)">"#));
    }

    #[tokio::test]
    async fn reports_malformed_data() {
        let surface = Surface::new(100, 100);
        let mut view = view(
            json!({"data": [{"name": "points", "url": "points.json"}]}),
            "[{\"x\": 1",
            &surface,
        );
        let err = view.run().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Json(_))));
        assert_eq!(surface.presentations(), 0);
    }

    #[test]
    fn ignores_unrecognized_configuration_keys() {
        let config = Config::default()
            .with("width", 50)
            .unwrap()
            .with("theme", "dark")
            .unwrap();
        let runtime = SvgRuntime::new(&config).unwrap();
        assert_eq!(runtime.defaults.width, Some(50));
    }

    #[test]
    fn rejects_mistyped_configuration() {
        let config = Config::default().with("padding", "wide").unwrap();
        let err = SvgRuntime::new(&config).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidConfigValue(k)) if k == "padding"));
    }
}
