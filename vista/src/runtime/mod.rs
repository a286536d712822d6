//! The visualization runtime capability, along with a reference
//! implementation that renders to SVG.

use std::rc::Rc;

use eyre::Result;
use futures_util::future::LocalBoxFuture;
use serde_json::Value as JsonValue;

use crate::{Dataset, Loader, Surface};

mod lite;
mod program;
mod scale;
mod svg;
mod template;

pub use lite::compile_lite;
pub use program::Program;
pub use svg::{SvgRuntime, SvgView};
pub use template::Templates;

/// Compiles spec documents into programs and creates views executing them.
pub trait Runtime {
    /// An executable program built from a low-level document.
    type Program;
    /// A live execution of a program.
    type View: RuntimeView + 'static;

    /// Compile a high-level document down to the low-level dialect.
    fn compile_high_level(&self, doc: JsonValue) -> Result<JsonValue>;

    /// Build an executable program from a low-level document.
    fn build_program(&self, doc: JsonValue) -> Result<Self::Program>;

    /// Create a view executing the given program. Any data the program
    /// references by URI is fetched through the given loader.
    fn create_view(&self, program: Self::Program, loader: Rc<dyn Loader>) -> Self::View;
}

/// A stateful execution of a program, bound to a render target.
pub trait RuntimeView {
    /// Bind the view to the surface it renders to.
    fn attach(&mut self, target: &Surface);

    /// Provide the rows of the named dataset.
    fn load_dataset(&mut self, name: &str, rows: Dataset);

    /// Start executing the program. The returned future resolves once the
    /// view is live, or fails if execution failed.
    fn run(&mut self) -> LocalBoxFuture<'static, Result<()>>;

    /// Lay the view out again at its target's current size.
    fn resize(&mut self);

    /// Release the view. A finalized view never draws again.
    fn finalize(&mut self);
}
