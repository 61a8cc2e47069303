use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

/// cqc - compile nested query documents into prepared Postgres statements
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Document declaring tables and queries
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only compile the named query (repeatable)
    #[arg(short, long = "query")]
    queries: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let statements = cqc::compile_source(&source, &cli.queries)?;

    for name in &cli.queries {
        if !statements.iter().any(|s| &s.query == name) {
            log::warn!("no query named {} in {}", name, cli.input.display());
        }
    }

    let mut sql = String::new();
    for statement in &statements {
        sql.push_str(&statement.sql);
        sql.push('\n');
    }

    match cli.output {
        Some(path) => fs::write(&path, &sql)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", sql),
    }
    Ok(())
}
