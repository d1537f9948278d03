use clap::{Args, Parser, Subcommand};
use pagewright::{
    Margins, PageGeometry, Pagewright, PagewrightError, Preset, RenderOptions, inspect_pdf_path,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about = "Paginate HTML blocks into raster PDF pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paginate an HTML file and write the PDF.
    Render {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Slice one full-document raster instead of breaking between blocks.
        #[arg(long, default_value_t = false)]
        unpaginated: bool,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Print the page assignment as JSON.
    Plan {
        input: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Report page sizes and embedded images of a PDF.
    Inspect { input: PathBuf },
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Custom stylesheet applied before measuring.
    #[arg(long)]
    css: Option<PathBuf>,
    /// high, standard or compact.
    #[arg(long, default_value = "standard")]
    preset: Preset,
    /// JSON file with render options; overrides the preset.
    #[arg(long)]
    options: Option<PathBuf>,
    #[arg(long)]
    scale: Option<f32>,
    #[arg(long)]
    quality: Option<f32>,
    #[arg(long)]
    dpi: Option<u32>,
    /// a4, a5, letter or legal.
    #[arg(long, default_value = "a4", env = "PAGEWRIGHT_PAGE_SIZE")]
    page_size: String,
    /// Uniform page margin in millimetres.
    #[arg(long)]
    margin: Option<f32>,
    /// Keep PNG previews and log per-page detail.
    #[arg(long, default_value_t = false)]
    show_preview: bool,
    #[arg(long, default_value_t = false)]
    parallel: bool,
    /// Write JSONL timing records here.
    #[arg(long)]
    perf_log: Option<PathBuf>,
}

impl EngineArgs {
    fn build(&self) -> Result<Pagewright, PagewrightError> {
        let mut options = match &self.options {
            Some(path) => RenderOptions::from_json(&fs::read_to_string(path)?)?,
            None => self.preset.options(),
        };
        if let Some(scale) = self.scale {
            options.scale = scale;
        }
        if let Some(quality) = self.quality {
            options.quality = quality;
        }
        if self.dpi.is_some() {
            options.dpi = self.dpi;
        }
        options.show_preview |= self.show_preview;
        options.parallel_measure |= self.parallel;

        let mut geometry = PageGeometry::from_name(&self.page_size).ok_or_else(|| {
            PagewrightError::InvalidConfiguration(format!(
                "unknown page size '{}' (expected a4, a5, letter or legal)",
                self.page_size
            ))
        })?;
        if let Some(margin) = self.margin {
            geometry = geometry.with_margins(Margins::all(margin));
        }

        let mut builder = Pagewright::builder()
            .page_geometry(geometry)
            .options(options);
        if let Some(path) = &self.css {
            builder = builder.stylesheet(fs::read_to_string(path)?);
        }
        if let Some(path) = &self.perf_log {
            builder = builder.perf_log(path);
        }
        builder.build()
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Render {
            input,
            output,
            unpaginated,
            engine,
        } => {
            let markup = fs::read_to_string(&input)?;
            let engine = engine.build()?;
            if unpaginated {
                let document = engine.render_unpaginated(&markup)?;
                document.save(&output)?;
                println!(
                    "wrote {} ({} physical pages)",
                    output.display(),
                    document.physical_pages
                );
            } else {
                let result = engine.render_to_file(&markup, &output)?;
                println!(
                    "wrote {} ({} pages, {} physical)",
                    output.display(),
                    result.total_pages,
                    result.document.physical_pages
                );
                for discrepancy in &result.discrepancies {
                    eprintln!(
                        "page {}: planned {:.2}mm, composed {:.2}mm",
                        discrepancy.page, discrepancy.planned_mm, discrepancy.composed_mm
                    );
                }
            }
            engine.flush_perf();
        }
        Command::Plan { input, engine } => {
            let markup = fs::read_to_string(&input)?;
            let plan = engine.build()?.plan(&markup)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Inspect { input } => {
            let report = inspect_pdf_path(&input)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "pagewright=info");
        }
    }
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
