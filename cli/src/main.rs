//! docmerge CLI - fill Word templates from the command line
//!
//! Generates DOCX documents from `${token}` templates and a JSON plan or
//! inline `--set` values.

use clap::{Parser, Subcommand};
use colored::*;
use docmerge::{
    Document, GenerateOptions, Outcome, PlanBuilder, ReplacementPlan, TextOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Word template merge engine
#[derive(Parser)]
#[command(
    name = "docmerge",
    author = "iyulab",
    version,
    about = "Fill ${token} placeholders in Word templates",
    long_about = "docmerge - placeholder merge engine for Word (DOCX) templates.\n\n\
                  Replaces ${token} markers with text or images and clones table rows\n\
                  from a JSON plan."
)]
struct Cli {
    /// Log generation details (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a document from a template
    #[command(visible_alias = "gen")]
    Generate {
        /// Template file path
        template: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// JSON replacement plan
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Inline text replacement, applied after the plan (repeatable)
        #[arg(short, long = "set", value_name = "TOKEN=VALUE", value_parser = parse_assignment)]
        set: Vec<(String, String)>,

        /// Treat line breaks in --set values as paragraph line breaks
        #[arg(long)]
        multiline: bool,

        /// Directory that relative paths are resolved against
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Regenerate even if the output already exists
        #[arg(long)]
        uncached: bool,
    },

    /// List the placeholders of a template
    #[command(visible_alias = "vars")]
    Variables {
        /// Template file path
        template: PathBuf,

        /// Output as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show template information
    Info {
        /// Template file path
        template: PathBuf,
    },

    /// Show version information
    Version,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((token, value)) if !token.trim().is_empty() => {
            Ok((token.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected TOKEN=VALUE, got '{}'", raw)),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Generate {
            template,
            output,
            plan,
            set,
            multiline,
            base_dir,
            uncached,
        } => {
            let mut options = GenerateOptions::new().with_uncached(uncached);
            if let Some(dir) = base_dir {
                options = options.with_base_dir(dir);
            }

            let plan = build_plan(plan.map(|p| options.resolve(&p)), set, multiline)?;

            let pb = create_spinner("Generating document...");
            let outcome = docmerge::generate_file(&template, &output, &plan, &options);
            pb.finish_and_clear();

            match outcome? {
                Outcome::Cached => {
                    println!(
                        "{} Reused existing {} (use --uncached to regenerate)",
                        "✓".green().bold(),
                        output.display()
                    );
                }
                Outcome::Generated(report) => {
                    for warning in &report.warnings {
                        eprintln!("{} {}", "!".yellow().bold(), warning);
                    }
                    println!(
                        "{} Generated {} ({} text, {} images, {} cloned rows)",
                        "✓".green().bold(),
                        output.display(),
                        report.text_replacements,
                        report.image_replacements,
                        report.cloned_rows
                    );
                }
            }
        }

        Commands::Variables { template, json } => {
            let tokens = docmerge::variables(&template)?;
            let content = if json {
                serde_json::to_string_pretty(&tokens)?
            } else {
                tokens.join("\n")
            };
            write_output(&content)?;
        }

        Commands::Info { template } => {
            let pb = create_spinner("Analyzing template...");
            let doc = Document::open(&template)?;
            let tokens = doc.variables();
            pb.finish_and_clear();

            println!("{}", "Template Information".cyan().bold());
            println!("{}", "─".repeat(40));
            println!(
                "{}: {}",
                "File".bold(),
                template.file_name().unwrap_or_default().to_string_lossy()
            );
            println!("{}: {}", "Kind".bold(), doc.kind());
            println!("{}: {}", "Main part".bold(), doc.main_part_path());
            for part in doc.part_paths().skip(1) {
                println!("{}: {}", "Story part".bold(), part);
            }
            println!("{}: {}", "Placeholders".bold(), tokens.len());
        }

        Commands::Version => {
            print_version();
        }
    }

    Ok(())
}

fn build_plan(
    plan_file: Option<PathBuf>,
    assignments: Vec<(String, String)>,
    multiline: bool,
) -> docmerge::Result<ReplacementPlan> {
    let base = match plan_file {
        Some(path) => ReplacementPlan::from_json_file(path)?,
        None => ReplacementPlan::default(),
    };
    if assignments.is_empty() {
        return Ok(base);
    }

    let options = TextOptions::new().with_multiline(multiline);
    let builder = assignments
        .into_iter()
        .fold(PlanBuilder::from(base), |builder, (token, value)| {
            builder.replace_with_options(&token, value, options.clone())
        });
    Ok(builder.build())
}

fn print_version() {
    println!("{} {}", "docmerge".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("Placeholder merge engine for Word templates");
    println!();
    println!("Supported formats: DOCX, DOTX, DOCM, DOTM");
    println!("Repository: https://github.com/iyulab/docmerge");
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn write_output(content: &str) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", content)
}
