use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use counter_glue::{
    binding::{self, InitOptions},
    dom::{Document, Page},
    value::Value,
    Instance, Module, Store,
};
use std::path::PathBuf;
use tracing::{debug, info, Level};

#[derive(Debug, Parser)]
#[command(version, about = "Drive a wasm counter library from button clicks")]
struct Cli {
    /// Verbosity (none: info, errors & warnings, -v: debug, -vv: trace).
    #[arg(short, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bind a module's counter exports to a page and replay clicks on it.
    Run {
        /// Module to load, binary or text format.
        module: PathBuf,

        /// JSON page description. Without it, `--buttons` buttons are generated.
        #[arg(long, conflicts_with = "buttons")]
        page: Option<PathBuf>,

        /// Number of `.some-button` elements to generate.
        #[arg(long, default_value_t = 2)]
        buttons: usize,

        /// Index of the element to click, in order. Repeatable.
        #[arg(long = "click")]
        clicks: Vec<usize>,

        /// Tear the runtime down after its entry point instead of keeping exports alive.
        #[arg(long)]
        exit_runtime: bool,
    },
    /// Call one export with i32 arguments and print its results.
    Call {
        module: PathBuf,
        export: String,
        #[arg(allow_negative_numbers = true)]
        args: Vec<i32>,
    },
    /// List a module's exports and their signatures.
    Exports { module: PathBuf },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Command::Run {
            module,
            page,
            buttons,
            clicks,
            exit_runtime,
        } => {
            let page = match page {
                Some(path) => Page::from_file(path)?,
                None => Page::buttons(buttons),
            };
            let options = InitOptions {
                no_exit_runtime: !exit_runtime,
            };
            run(module, page, &clicks, options).await
        }
        Command::Call {
            module,
            export,
            args,
        } => {
            println!("{}", call(module, &export, args)?);
            Ok(())
        }
        Command::Exports { module } => {
            for line in exports(module)? {
                println!("{line}");
            }
            Ok(())
        }
    }
}

async fn run(module: PathBuf, page: Page, clicks: &[usize], options: InitOptions) -> Result<()> {
    let mut document = Document::from_page(page);
    let binding = binding::start(&mut document, binding::fetch(module), options).await?;
    binding::replay_clicks(&mut document, clicks)?;

    for (id, element) in document.elements() {
        println!("{}\t{}", id.index(), element.text_content());
    }
    info!(
        handle = binding.counter().handle(),
        value = binding.counter().get()?,
        bound = binding.buttons().len(),
        "final counter"
    );

    Ok(())
}

fn call(module: PathBuf, export: &str, args: Vec<i32>) -> Result<String> {
    let module = Module::from_file(module)?;
    let mut store = Store::default();
    let instance = Instance::new(&mut store, &module)?;

    let func = instance.get_func(&store, export)?;
    debug!(name = func.name(), ty = %func.ty(), "calling export");
    let args: Vec<Value> = args.into_iter().map(Value::I32).collect();
    let results = func.call(&mut store, &args)?;

    Ok(results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" "))
}

fn exports(module: PathBuf) -> Result<Vec<String>> {
    let module = Module::from_file(module)?;
    let mut store = Store::default();
    let instance = Instance::new(&mut store, &module)?;

    Ok(instance
        .exports(&store)?
        .iter()
        .map(ToString::to_string)
        .collect())
}
