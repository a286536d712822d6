//! The render controller: turns a spec and a data bundle into a live
//! runtime view.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use eyre::Result;
use futures_util::future::LocalBoxFuture;
use log::{debug, warn};
use serde_json::Value as JsonValue;

use crate::query::{QueryEngine, QueryLoader};
use crate::runtime::{Runtime, RuntimeView};
use crate::shallow::shallow_eq;
use crate::{error_message, DataBundle, Dialect, Error, RedrawScheduler, Surface};

/// The externally visible state of a [`RenderController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// There is nothing to render: the spec, the data or both are missing.
    Empty,
    /// A render is in flight.
    Loading,
    /// The last render failed. See [`RenderController::error`].
    Error,
    /// A runtime view is live.
    Done,
}

// The view and the in-flight token live inside the phase, so they can only
// exist in the states that own them.
enum Phase<V> {
    Empty,
    Loading { token: u64, view: V },
    Failed(String),
    Done { view: V },
}

enum Rebuild {
    Idle,
    Started(u64, LocalBoxFuture<'static, Result<()>>),
    Failed,
}

struct Inner<R: Runtime> {
    target: Surface,
    runtime: R,
    redraw: Rc<dyn RedrawScheduler>,
    spec: Option<String>,
    data: Option<DataBundle>,
    engine: Option<Rc<dyn QueryEngine>>,
    phase: Phase<R::View>,
    next_token: u64,
}

/// Renders a spec against a data bundle into a surface mounted by the host.
///
/// Any accepted change to the spec or the data synchronously tears down the
/// current render and starts building a new one in the background. Results
/// of builds that have since been superseded are discarded.
///
/// Builds are driven with [`tokio::task::spawn_local`], so the controller
/// must be used from within a [`tokio::task::LocalSet`].
pub struct RenderController<R: Runtime + 'static> {
    inner: Rc<RefCell<Inner<R>>>,
}

impl<R: Runtime + 'static> RenderController<R> {
    /// Constructor.
    pub fn new(target: Surface, runtime: R, redraw: Rc<dyn RedrawScheduler>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                target,
                runtime,
                redraw,
                spec: None,
                data: None,
                engine: None,
                phase: Phase::Empty,
                next_token: 1,
            })),
        }
    }

    /// The current status of the controller.
    pub fn status(&self) -> RenderStatus {
        match self.inner.borrow().phase {
            Phase::Empty => RenderStatus::Empty,
            Phase::Loading { .. } => RenderStatus::Loading,
            Phase::Failed(_) => RenderStatus::Error,
            Phase::Done { .. } => RenderStatus::Done,
        }
    }

    /// The reason for the last failure, or an empty string if the status is
    /// not [`RenderStatus::Error`].
    pub fn error(&self) -> String {
        match &self.inner.borrow().phase {
            Phase::Failed(msg) => msg.clone(),
            _ => String::new(),
        }
    }

    /// Replaces the spec. Setting the spec that is already held does nothing.
    pub fn set_spec<S: Into<String>>(&self, spec: S) {
        let spec = spec.into();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.spec.as_deref() == Some(spec.as_str()) {
                return;
            }
            inner.spec = Some(spec);
        }
        self.update_view();
    }

    /// Replaces the data bundle. A bundle holding the same datasets as the
    /// current one (see [`crate::ShallowEq`]) does nothing.
    pub fn set_data(&self, data: DataBundle) {
        {
            let mut inner = self.inner.borrow_mut();
            if shallow_eq(inner.data.as_ref(), Some(&data)) {
                return;
            }
            inner.data = Some(data);
        }
        self.update_view();
    }

    /// Replaces the query engine used by future renders. Does not affect the
    /// current render.
    pub fn set_engine(&self, engine: Option<Rc<dyn QueryEngine>>) {
        self.inner.borrow_mut().engine = engine;
    }

    /// Forwards a resize of the host's surface to the current view, if any.
    pub fn on_resize(&self) {
        let mut inner = self.inner.borrow_mut();
        match &mut inner.phase {
            Phase::Loading { view, .. } | Phase::Done { view } => view.resize(),
            Phase::Empty | Phase::Failed(_) => {}
        }
    }

    /// Tears down the current render, discards any render in flight and
    /// forgets the spec and data. Safe to call repeatedly.
    pub fn dispose(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.spec = None;
            inner.data = None;
        }
        self.update_view();
    }

    fn update_view(&self) {
        let rebuild = self.inner.borrow_mut().rebuild();
        match rebuild {
            Rebuild::Idle => {}
            Rebuild::Started(token, pending) => {
                let inner = Rc::downgrade(&self.inner);
                tokio::task::spawn_local(watch(inner, token, pending));
            }
            Rebuild::Failed => {
                let redraw = self.inner.borrow().redraw.clone();
                redraw.schedule_full_redraw();
            }
        }
    }
}

impl<R: Runtime + 'static> Drop for RenderController<R> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_borrow_mut() {
            inner.teardown();
        }
    }
}

async fn watch<R: Runtime + 'static>(
    inner: Weak<RefCell<Inner<R>>>,
    token: u64,
    pending: LocalBoxFuture<'static, Result<()>>,
) {
    let result = pending.await;
    match inner.upgrade() {
        Some(inner) => Inner::complete(&inner, token, result),
        None => debug!("Render {} finished after its controller was dropped", token),
    }
}

impl<R: Runtime> Inner<R> {
    fn teardown(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Empty) {
            Phase::Loading { token, mut view } => {
                debug!("Discarding in-flight render {}", token);
                view.finalize();
            }
            Phase::Done { mut view } => view.finalize(),
            Phase::Empty | Phase::Failed(_) => {}
        }
    }

    fn rebuild(&mut self) -> Rebuild {
        self.teardown();
        let built = match (&self.spec, &self.data) {
            (Some(spec), Some(data)) => self.build_view(spec, data),
            _ => return Rebuild::Idle,
        };
        let mut view = match built {
            Ok(view) => view,
            Err(e) => {
                let msg = error_message(&e);
                warn!("Failed to build visualization: {}", msg);
                self.phase = Phase::Failed(msg);
                return Rebuild::Failed;
            }
        };
        let token = self.next_token;
        self.next_token += 1;
        let pending = view.run();
        debug!("Started render {}", token);
        self.phase = Phase::Loading { token, view };
        Rebuild::Started(token, pending)
    }

    fn build_view(&self, spec: &str, data: &DataBundle) -> Result<R::View> {
        let mut doc: JsonValue = serde_json::from_str(spec).map_err(Error::SpecParse)?;
        if Dialect::detect(&doc) == Dialect::High {
            doc = self.runtime.compile_high_level(doc)?;
        }
        let program = self.runtime.build_program(doc)?;
        let loader = Rc::new(QueryLoader::new(self.engine.clone()));
        let mut view = self.runtime.create_view(program, loader);
        view.attach(&self.target);
        for (name, rows) in data {
            view.load_dataset(name, rows.clone());
        }
        Ok(view)
    }

    fn complete(cell: &RefCell<Self>, token: u64, result: Result<()>) {
        let redraw = {
            let mut inner = cell.borrow_mut();
            match std::mem::replace(&mut inner.phase, Phase::Empty) {
                Phase::Loading {
                    token: current,
                    mut view,
                } if current == token => {
                    match result {
                        Ok(()) => {
                            debug!("Render {} is live", token);
                            inner.phase = Phase::Done { view };
                        }
                        Err(e) => {
                            view.finalize();
                            let msg = error_message(&e.wrap_err(Error::RuntimeExecution));
                            warn!("Render {} failed: {}", token, msg);
                            inner.phase = Phase::Failed(msg);
                        }
                    }
                    inner.redraw.clone()
                }
                other => {
                    inner.phase = other;
                    debug!("Discarding result of superseded render {}", token);
                    return;
                }
            }
        };
        redraw.schedule_full_redraw();
    }
}
