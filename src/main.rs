// Thu Feb 5 2026 - Alex

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use native_symbol_db::{
    graph::ALL_KINDS,
    source::{JsonSymbolSource, SymbolSource},
    utils::{format_bytes, format_duration, logging, pluralize},
    Database, GraphBuilder, TypeRegistry,
};
use serde::Serialize;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Native symbol database builder and inspector", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a database from a JSON symbol dump.
    Build {
        #[arg(short, long)]
        dump: PathBuf,

        #[arg(short, long, default_value = "symbols.nsdb")]
        output: PathBuf,

        #[arg(long)]
        no_progress: bool,
    },
    /// Summarize an existing database.
    Dump {
        #[arg(short, long)]
        database: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let args = Args::parse();
    logging::init_logger(args.verbose);

    let result = match args.command {
        Command::Build { dump, output, no_progress } => cmd_build(dump, output, no_progress),
        Command::Dump { database, json } => cmd_dump(database, json),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "[!]".red(), e);
        std::process::exit(1);
    }
}

fn cmd_build(dump: PathBuf, output: PathBuf, no_progress: bool) -> anyhow::Result<()> {
    println!("{}", "Native Symbol Database".cyan().bold());
    println!("{}", "=".repeat(50).cyan());
    println!();

    let start_time = Instant::now();

    let progress = if !no_progress {
        let pb = ProgressBar::new(3);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    println!("{} Loading symbol dump: {}", "[*]".blue(), dump.display());
    if let Some(pb) = &progress {
        pb.set_message("Parsing symbol dump...");
    }
    let source = JsonSymbolSource::from_path(&dump)
        .with_context(|| format!("cannot load symbol dump {}", dump.display()))?;
    if let Some(pb) = &progress {
        pb.inc(1);
        pb.set_message("Building symbol graph...");
    }

    let mut builder = GraphBuilder::new();
    source.populate(&mut builder).context("symbol dump does not describe a valid graph")?;
    let graph = builder.finish();
    println!("{} Graph built: {}", "[+]".green(), pluralize(graph.len(), "node", "nodes"));
    if let Some(pb) = &progress {
        pb.inc(1);
        pb.set_message("Writing database...");
    }

    let stats = native_symbol_db::save_to_file(&graph, &output)
        .with_context(|| format!("cannot write database {}", output.display()))?;
    if let Some(pb) = &progress {
        pb.inc(1);
        pb.finish_with_message("Complete!");
    }

    println!("{} Database saved to: {}", "[+]".green(), output.display());
    println!();
    println!("{}", "=".repeat(50).cyan());
    println!(
        "{} Wrote {} ({}) in {}",
        "[+]".green(),
        pluralize(stats.total_nodes as usize, "node", "nodes"),
        format_bytes(stats.bytes_written),
        format_duration(start_time.elapsed())
    );
    Ok(())
}

#[derive(Serialize)]
struct DumpSummary {
    total_nodes: u32,
    per_kind: Vec<(String, u32)>,
    roots: Vec<String>,
}

fn cmd_dump(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let db = Database::open(&path, Rc::new(TypeRegistry::new()))
        .with_context(|| format!("cannot open database {}", path.display()))?;

    let per_kind: Vec<(String, u32)> = ALL_KINDS
        .iter()
        .map(|&kind| (kind.name().to_string(), db.count_of(kind)))
        .filter(|(_, count)| *count > 0)
        .collect();
    let mut roots = db.root()?.names()?;
    roots.sort();

    if json {
        let summary = DumpSummary { total_nodes: db.node_count(), per_kind, roots };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", "Database Summary".cyan().bold());
    println!("{}", "-".repeat(40).cyan());
    println!("  Total nodes: {}", db.node_count().to_string().green());
    for (kind, count) in &per_kind {
        println!("  {:<22} {}", kind, count.to_string().green());
    }
    println!();
    println!("{}", "Root scope:".yellow().bold());
    println!("  {}", roots.iter().join(", "));
    Ok(())
}
