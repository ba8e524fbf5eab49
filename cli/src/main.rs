//! psthumb CLI - thumbnails for PostScript, EPS, PDF and DVI documents

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use psthumb::{
    dsc, sniff_path, DocumentKind, DocumentMetadata, PreviewKind, RasterizerConfig,
    ThumbnailOptions, Thumbnailer,
};

#[derive(Parser)]
#[command(name = "psthumb")]
#[command(author = "iyulab")]
#[command(version)]
#[command(about = "Create thumbnails of PostScript, EPS, PDF and DVI documents", long_about = None)]
struct Cli {
    /// Input documents
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Output file (single input) or directory
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Thumbnail size as WIDTHxHEIGHT
    #[arg(short, long, default_value = "128x128", value_parser = parse_size)]
    size: (u32, u32),

    #[command(flatten)]
    rasterizer: RasterizerArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Clone)]
struct RasterizerArgs {
    /// Ghostscript executable
    #[arg(long, global = true, env = "PSTHUMB_GS", default_value = psthumb::render::DEFAULT_GHOSTSCRIPT)]
    gs: PathBuf,

    /// dvips executable, used for DVI input
    #[arg(long, global = true, env = "PSTHUMB_DVIPS", default_value = psthumb::render::DEFAULT_DVIPS)]
    dvips: PathBuf,

    /// Seconds without rasterizer output before giving up
    #[arg(long, global = true, default_value = "20")]
    idle_timeout: u64,

    /// Always render, even when an EPSI preview is embedded
    #[arg(long, global = true)]
    no_preview: bool,
}

impl RasterizerArgs {
    fn thumbnailer(&self) -> Thumbnailer {
        let config = RasterizerConfig::new()
            .with_ghostscript(&self.gs)
            .with_dvips(&self.dvips)
            .with_idle_timeout(Duration::from_secs(self.idle_timeout.max(1)));
        Thumbnailer::new(
            ThumbnailOptions::new()
                .with_rasterizer(config)
                .with_embedded_preview(!self.no_preview)
                .with_sigterm_routing(cfg!(unix)),
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create thumbnails
    #[command(alias = "thumb")]
    Thumbnail {
        /// Input documents
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (single input) or directory
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Thumbnail size as WIDTHxHEIGHT
        #[arg(short, long, default_value = "128x128", value_parser = parse_size)]
        size: (u32, u32),
    },

    /// Show document structuring information
    Info {
        /// Input document
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Scan the whole document, not just the header
        #[arg(long)]
        full: bool,

        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Thumbnail {
            inputs,
            output,
            size,
        }) => cmd_thumbnail(&inputs, output.as_deref(), size, &cli.rasterizer),
        Some(Commands::Info { input, full, json }) => cmd_info(&input, full, json),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: thumbnail the given inputs
            if cli.inputs.is_empty() {
                println!("{}", "Usage: psthumb <FILE>... [-o OUTPUT] [-s WxH]".yellow());
                println!("       psthumb --help for more information");
                Ok(())
            } else {
                cmd_thumbnail(&cli.inputs, cli.output.as_deref(), cli.size, &cli.rasterizer)
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("width and height must be positive".into());
    }
    Ok((w, h))
}

/// Where the thumbnail of `input` is written.
fn output_path(input: &Path, output: Option<&Path>, single: bool) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let name = format!("{}_thumb.png", stem);
    match output {
        Some(path) if single && !path.is_dir() => path.to_path_buf(),
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

fn cmd_thumbnail(
    inputs: &[PathBuf],
    output: Option<&Path>,
    (width, height): (u32, u32),
    rasterizer: &RasterizerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let single = inputs.len() == 1;
    if let Some(dir) = output.filter(|_| !single) {
        fs::create_dir_all(dir)?;
    }

    let mut thumbnailer = rasterizer.thumbnailer();

    if single {
        let input = &inputs[0];
        let raster = thumbnailer.create(input, width, height)?;
        let path = output_path(input, output, true);
        raster.save_png(&path)?;
        println!(
            "{} {} ({}x{})",
            "Saved to".green(),
            path.display(),
            raster.width(),
            raster.height()
        );
        return Ok(());
    }

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut failed = 0;
    for input in inputs {
        pb.set_message(input.display().to_string());
        let path = output_path(input, output, false);
        let result = thumbnailer
            .create(input, width, height)
            .and_then(|raster| raster.save_png(&path));
        if let Err(e) = result {
            pb.println(format!("{} {}: {}", "Failed".red(), input.display(), e));
            failed += 1;
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done!");

    println!(
        "\n{} {} of {} thumbnails created",
        "Done!".green().bold(),
        inputs.len() - failed,
        inputs.len()
    );
    if failed > 0 {
        return Err(format!("{} document(s) could not be previewed", failed).into());
    }
    Ok(())
}

fn cmd_info(input: &Path, full: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sniff = sniff_path(input)?;
    let meta = match sniff.kind {
        DocumentKind::Dvi => DocumentMetadata::default(),
        _ if full => dsc::scan_file(input)?,
        _ => dsc::scan_header(input)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), describe_kind(&sniff.kind));
    if sniff.is_malformed() || meta.is_malformed() {
        println!("{}: {}", "Framing".bold(), "printer control (PJL or Ctrl-D)".yellow());
    }
    if matches!(sniff.kind, DocumentKind::Dvi) {
        return Ok(());
    }

    if let Some(ref title) = meta.title {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(ref creator) = meta.creator {
        println!("{}: {}", "Creator".bold(), creator);
    }
    if let Some(ref date) = meta.creation_date {
        println!("{}: {}", "Created".bold(), date);
    }
    if let Some(ref whom) = meta.for_whom {
        println!("{}: {}", "For".bold(), whom);
    }
    if let Some(level) = meta.language_level {
        println!("{}: {}", "Language Level".bold(), level);
    }

    match meta.bounding_box {
        Some(bbox) if bbox.is_usable() => {
            println!(
                "{}: {} ({}x{} pt)",
                "Bounding Box".bold(),
                bbox,
                bbox.width(),
                bbox.height()
            );
        }
        Some(bbox) => println!("{}: {} {}", "Bounding Box".bold(), bbox, "(empty)".yellow()),
        None => println!("{}: {}", "Bounding Box".bold(), "none".dimmed()),
    }

    let pages = match meta.declared_pages {
        Some(declared) if full => format!("{} (declared {})", meta.page_count, declared),
        Some(declared) => declared.to_string(),
        None => meta.page_count.to_string(),
    };
    println!("{}: {}", "Pages".bold(), pages);

    let preview = match (meta.preview_kind, meta.epsi_preview) {
        (PreviewKind::Epsi, Some(epsi)) => format!(
            "EPSI {}x{}, {} bit{}",
            epsi.width,
            epsi.height,
            epsi.depth,
            if epsi.depth == 1 { "" } else { "s" }
        ),
        (PreviewKind::None, _) => "none".to_string(),
        (kind, _) => format!("{:?}", kind),
    };
    println!("{}: {}", "Preview".bold(), preview);

    for media in &meta.media {
        println!(
            "{}: {} ({}x{} pt)",
            "Media".bold(),
            media.name,
            media.width,
            media.height
        );
    }

    Ok(())
}

fn describe_kind(kind: &DocumentKind) -> String {
    match kind {
        DocumentKind::PostScript {
            dsc_version,
            epsf: true,
        } => format!("EPS (DSC {})", dsc_version.as_deref().unwrap_or("?")),
        DocumentKind::PostScript {
            dsc_version: Some(version),
            ..
        } => format!("PostScript (DSC {})", version),
        DocumentKind::PostScript { .. } => "PostScript".to_string(),
        DocumentKind::Pdf => "PDF".to_string(),
        DocumentKind::Dvi => "DVI".to_string(),
        DocumentKind::DosEps(_) => "EPS with DOS binary header".to_string(),
        DocumentKind::MacBinary(_) => "MacBinary EPSF".to_string(),
        DocumentKind::Unknown => "unknown".to_string(),
    }
}

fn cmd_version() {
    println!("{} {}", "psthumb".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("Thumbnails for PostScript, EPS, PDF and DVI documents");
    println!();
    println!("Repository: {}", "https://github.com/iyulab/psthumb".dimmed());
    println!("License: MIT");
}
