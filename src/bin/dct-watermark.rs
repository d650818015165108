use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dct_watermark::{default_output_path, ProcessResult, WatermarkEngine, WatermarkOptions};

#[derive(Parser)]
#[command(
    name = "dct-watermark",
    about = "Embed and verify invisible ownership watermarks via block DCT modulation",
    version,
    after_help = "Example: dct-watermark embed photo.png --owner 0xa1b2...  then\n         \
                  dct-watermark verify photo_watermarked.png --owner 0xa1b2...\n\n\
                  NOTE: Use lossless output formats (PNG, BMP, TIFF). JPEG recompression\n\
                  may destroy the watermark."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct OutputArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Embed an ownership watermark into an image
    Embed {
        /// Input image file
        input: PathBuf,

        /// Owner id to embed (e.g. an account address)
        #[arg(long)]
        owner: String,

        /// Output file (default: {name}_watermarked.{ext})
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Embedding strength (coefficient shift = strength * 100)
        #[arg(short, long, default_value = "0.5")]
        strength: f64,

        /// Skip re-extracting the watermark after embedding
        #[arg(long)]
        no_self_check: bool,
    },
    /// Verify that images carry a claimed owner's watermark
    Verify {
        /// Image files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Claimed owner id
        #[arg(long)]
        owner: String,
    },
}

fn init_logging(output: &OutputArgs) {
    let log_level = if output.verbose {
        "debug"
    } else if output.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("dct_watermark={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.output);

    let results = match cli.command {
        Command::Embed {
            input,
            owner,
            output,
            strength,
            no_self_check,
        } => {
            if !(strength.is_finite() && strength > 0.0) {
                eprintln!("Error: Strength must be a positive number");
                process::exit(1);
            }
            if !input.is_file() {
                eprintln!("Error: Input file does not exist: {}", input.display());
                process::exit(1);
            }
            let opts = WatermarkOptions {
                strength,
                self_check: !no_self_check,
                verbose: cli.output.verbose,
                quiet: cli.output.quiet,
                ..WatermarkOptions::default()
            };
            let output_path = output.unwrap_or_else(|| default_output_path(&input));
            let engine = WatermarkEngine::new(opts);
            vec![engine.embed_file(&input, &output_path, &owner)]
        }
        Command::Verify { inputs, owner } => {
            let opts = WatermarkOptions {
                verbose: cli.output.verbose,
                quiet: cli.output.quiet,
                ..WatermarkOptions::default()
            };
            let engine = WatermarkEngine::new(opts);
            let mut results = Vec::new();
            for input in &inputs {
                if input.is_dir() {
                    results.extend(engine.verify_directory(input, &owner));
                } else if input.exists() {
                    results.push(engine.verify_file(input, &owner));
                } else {
                    eprintln!("Error: Input path does not exist: {}", input.display());
                    process::exit(1);
                }
            }
            results
        }
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &cli.output);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.output.quiet {
        eprintln!();
        eprint!("[Summary] Passed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 || results.is_empty() {
        process::exit(1);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

fn print_result(result: &ProcessResult, output: &OutputArgs) {
    if output.quiet && result.success {
        return;
    }

    let filename = file_name(&result.path);

    if result.success {
        if result.confidence > 0.0 {
            eprintln!(
                "[OK] {filename} ({:.0}% confidence)",
                result.confidence * 100.0
            );
        } else {
            eprintln!("[OK] {filename}");
        }
    } else if result.confidence > 0.0 {
        eprintln!(
            "[FAIL] {filename} ({:.0}% confidence): {}",
            result.confidence * 100.0,
            result.message
        );
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if output.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
