use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use sheetfuse::engine::merge_inputs;
use sheetfuse::engine::Input;
use sheetfuse::merge::MergePolicy;
use sheetfuse::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "sheetfuse",
    version,
    about = "Merge Excel workbooks into a single spreadsheet"
)]
struct Cli {
    /// Input workbooks (.xlsx or .xls); glob patterns are expanded
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output workbook path
    #[arg(short, long, default_value = "merged.xlsx")]
    output: PathBuf,

    /// Fail when inputs do not share the first input's header instead of padding
    #[arg(long)]
    strict: bool,

    /// Rows of the merged table to print after the merge
    #[arg(long, default_value_t = 10)]
    preview: usize,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Uses the `RUST_LOG` env var if set, otherwise the --log-level flag.
fn init_logging(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let paths = expand_inputs(&cli.inputs)?;
    let total = paths.len();
    println!("Merging {total} file(s):");

    let inputs = paths.into_iter().map(Input::Path).collect();
    let policy = if cli.strict {
        MergePolicy::Strict
    } else {
        MergePolicy::Positional
    };
    let mut progress = |read: usize, total: usize, name: &str| {
        println!("  [{read}/{total}] {name}");
    };
    let outcome = match merge_inputs(inputs, policy, &mut progress) {
        Ok(outcome) => outcome,
        Err(error) => bail!("{}", error.user_message()),
    };

    std::fs::write(&cli.output, &outcome.workbook)
        .with_context(|| format!("failed to write '{}'", cli.output.display()))?;

    let table = &outcome.table;
    println!(
        "Merged {} row(s) x {} column(s) from {} file(s) into '{}'",
        table.row_count(),
        table.column_count(),
        total,
        cli.output.display(),
    );
    if cli.preview > 0 {
        print_preview(&table.header, table.preview(cli.preview));
    }
    Ok(())
}

/// Expands each argument as a glob pattern; a pattern with no matches is an
/// error rather than a silent no-op.
fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let mut matched = false;
        for entry in glob::glob(pattern).with_context(|| format!("invalid pattern '{pattern}'"))? {
            paths.push(entry?);
            matched = true;
        }
        if !matched {
            bail!("no files match '{pattern}'");
        }
    }
    Ok(paths)
}

fn print_preview(header: &[String], rows: &[Vec<Value>]) {
    println!("{}", header.join(" | "));
    for row in rows {
        let line = row
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" | ");
        println!("{line}");
    }
}
