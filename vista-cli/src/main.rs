use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use serde_json::Value as JsonValue;
use tokio::sync::Notify;
use tokio::task::LocalSet;
use vista::{
    error_message, Config, DataBundle, DefaultLoader, LoadOptions, Loader, RenderController,
    RenderStatus, SqliteEngine, SvgRuntime, Surface,
};

#[derive(Parser, Debug)]
#[clap(name = "vista", about, version)]
struct Args {
    /// Increase output logging verbosity.
    #[clap(short, long)]
    verbose: bool,

    /// The chart spec to render.
    spec: PathBuf,

    /// A named dataset, given as NAME=URI where URI is an HTTP(S) URL or a
    /// path relative to the spec's directory, pointing at a JSON array of
    /// rows. May be repeated.
    #[clap(short, long = "data")]
    data: Vec<String>,

    /// SQLite database against which URL-referenced datasets are queried.
    #[clap(long)]
    db: Option<PathBuf>,

    /// JSON configuration file for the renderer.
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Width of the drawing surface.
    #[clap(long, default_value = "640")]
    width: u32,

    /// Height of the drawing surface.
    #[clap(long, default_value = "480")]
    height: u32,

    /// Where to write the rendered SVG. Defaults to standard output.
    #[clap(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    let args = Args::parse();
    simple_logger::init_with_level(if args.verbose {
        log::Level::Debug
    } else {
        log::Level::Info
    })
    .unwrap();

    match render(&args) {
        Ok(_) => log::info!("Success!"),
        Err(e) => {
            log::error!("Failed: {}", error_message(&e));
            std::process::exit(1);
        }
    }
}

fn render(args: &Args) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("failed to start async runtime")?;
    LocalSet::new().block_on(&rt, render_chart(args))
}

async fn render_chart(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    let spec = fs::read_to_string(&args.spec)
        .wrap_err_with(|| format!("failed to read spec from {}", args.spec.display()))?;
    let loader = DefaultLoader::new(LoadOptions {
        base_url: args
            .spec
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.display().to_string()),
    });
    let data = load_bundle(&loader, &args.data).await?;

    let surface = Surface::new(args.width, args.height);
    let redraw = Rc::new(Notify::new());
    let controller = RenderController::new(surface.clone(), SvgRuntime::new(&config)?, redraw.clone());
    if let Some(db) = &args.db {
        log::debug!("Querying datasets against {}", db.display());
        controller.set_engine(Some(Rc::new(SqliteEngine::open(db)?)));
    }
    controller.set_spec(spec);
    controller.set_data(data);

    // Terminal transitions request exactly one redraw, and a request made
    // before we start waiting is not lost.
    if controller.status() != RenderStatus::Empty {
        redraw.notified().await;
    }
    let result = match controller.status() {
        RenderStatus::Done => write_output(args.output.as_deref(), &surface.content()),
        RenderStatus::Error => Err(eyre!(controller.error())),
        status => Err(eyre!("rendering did not complete (status: {:?})", status)),
    };
    controller.dispose();
    result
}

/// Load each `NAME=URI` argument into a named dataset.
async fn load_bundle(loader: &DefaultLoader, args: &[String]) -> Result<DataBundle> {
    let mut bundle = DataBundle::new();
    for arg in args {
        let (name, uri) = arg
            .split_once('=')
            .ok_or_else(|| eyre!("expected NAME=URI for dataset, got \"{}\"", arg))?;
        let content = loader
            .load(uri)
            .await
            .wrap_err_with(|| format!("failed to load dataset \"{}\" from {}", name, uri))?;
        let rows = match serde_json::from_str(&content)
            .wrap_err_with(|| format!("failed to parse dataset \"{}\"", name))?
        {
            JsonValue::Array(rows) => rows,
            _ => return Err(vista::Error::NotAnArray(uri.to_string()).into()),
        };
        log::debug!("Loaded {} row(s) for dataset {}", rows.len(), name);
        bundle.insert(name.to_string(), Rc::new(rows));
    }
    Ok(bundle)
}

fn write_output(output: Option<&Path>, svg: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, svg)
                .wrap_err_with(|| format!("failed to write output to {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{}", svg),
    }
    Ok(())
}
