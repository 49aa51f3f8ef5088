mod classfile;
mod descriptor;
mod engine;
mod load;
mod model;
mod names;
mod opcodes;
mod passes;
mod ranker;
mod report;
mod tables;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::engine::MergeEngine;
use crate::load::load_environment;
use crate::names::NamePolicy;
use crate::passes::install_default_pipeline;
use crate::report::write_mappings;

/// CLI arguments for a matching run.
#[derive(Parser, Debug)]
#[command(
    name = "jarmatch",
    about = "Maps obfuscated classes, methods, and fields between two versions of a JVM archive.",
    version
)]
struct Cli {
    /// Archive with the known (source) names.
    #[arg(value_name = "SRC")]
    src: PathBuf,
    /// Re-obfuscated archive to map against.
    #[arg(value_name = "TGT")]
    tgt: PathBuf,
    /// Mapping file to write; `-` for stdout.
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,
    /// Simple-name prefix marking a symbol as non-obfuscated (repeatable).
    #[arg(long, value_name = "PREFIX")]
    clean_prefix: Vec<String>,
    /// Skip the TF-IDF + KNN residual ranking stage.
    #[arg(long)]
    no_ranker: bool,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);
    run(cli)
}

fn init_tracing(quiet: bool) {
    let default_directive = if quiet { "jarmatch=error" } else { "jarmatch=info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(default_directive.parse().expect("static directive")),
        )
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    if !cli.src.exists() {
        anyhow::bail!("source archive not found: {}", cli.src.display());
    }
    if !cli.tgt.exists() {
        anyhow::bail!("target archive not found: {}", cli.tgt.display());
    }

    let policy = if cli.clean_prefix.is_empty() {
        NamePolicy::default()
    } else {
        NamePolicy::new(cli.clean_prefix.clone())
    };

    let started_at = Instant::now();
    let src_env = load_environment(&cli.src, &policy)
        .with_context(|| format!("failed to load {}", cli.src.display()))?;
    let tgt_env = load_environment(&cli.tgt, &policy)
        .with_context(|| format!("failed to load {}", cli.tgt.display()))?;
    let source_classes = src_env.class_count();
    let target_classes = tgt_env.class_count();

    let mut engine = MergeEngine::new(src_env, tgt_env);
    install_default_pipeline(&mut engine, !cli.no_ranker);
    let result = engine.run()?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("mappings.txt"));
    let mut writer = output_writer(&output)?;
    write_mappings(&result, writer.as_mut())
        .with_context(|| format!("failed to write {}", output.display()))?;

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={}/{} mappings={}",
            started_at.elapsed().as_millis(),
            source_classes,
            target_classes,
            result.mapping_count()
        );
    }

    Ok(())
}

fn output_writer(output: &Path) -> Result<Box<dyn Write>> {
    if output == Path::new("-") {
        return Ok(Box::new(io::stdout()));
    }
    Ok(Box::new(File::create(output).with_context(|| {
        format!("failed to open {}", output.display())
    })?))
}
