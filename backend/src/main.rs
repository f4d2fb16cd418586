//! Tablesmith CLI - Load, transform and export CSV tables
//!
//! # Commands
//!
//! ```bash
//! tablesmith inspect staff.csv                 # Shape, preview and form options
//! tablesmith describe --sample                 # Summary statistics
//! tablesmith transform staff.csv --bonus --sort salary --descending --format xlsx
//! tablesmith serve                             # Start HTTP server (port 3000)
//! ```

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use tablesmith::{
    controls, describe, export_all, export_named, parse_file, run, sample_table, AgeFilter,
    AppConfig, DepartmentFilter, ExportFormat, LoadOptions, Sort, SortOrder, Table,
    TransformRequest, Uppercase,
};

#[derive(Parser)]
#[command(name = "tablesmith")]
#[command(about = "Load a CSV file, transform it and export CSV / XLSX / JSON", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Input CSV file
    input: Option<PathBuf>,

    /// Use the bundled sample employee data instead of a file
    #[arg(long, conflicts_with = "input")]
    sample: bool,

    /// CSV delimiter (default: ',')
    #[arg(short, long)]
    delimiter: Option<char>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the table shape, a preview and the available options
    Inspect {
        #[command(flatten)]
        source: SourceArgs,

        /// Number of preview rows
        #[arg(short = 'n', long)]
        rows: Option<usize>,
    },

    /// Summary statistics of the numeric columns
    Describe {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Run the transformation pipeline and write the exports
    Transform {
        #[command(flatten)]
        source: SourceArgs,

        /// Upper-case a text column (first text column if no name is given)
        #[arg(long, value_name = "COLUMN", num_args = 0..=1)]
        uppercase: Option<Option<String>>,

        /// Add salary_with_bonus = salary × 1.1
        #[arg(long)]
        bonus: bool,

        /// Add years_of_service computed from join_date
        #[arg(long)]
        years_of_service: bool,

        /// Keep one department (first one if no value is given)
        #[arg(long, value_name = "VALUE", num_args = 0..=1)]
        department: Option<Option<String>>,

        /// Filter on age (bounds default to the observed range)
        #[arg(long)]
        age_filter: bool,

        /// Lower age bound, inclusive (implies --age-filter)
        #[arg(long)]
        age_min: Option<i64>,

        /// Upper age bound, inclusive (implies --age-filter)
        #[arg(long)]
        age_max: Option<i64>,

        /// Sort by a column (first column if no name is given)
        #[arg(long, value_name = "COLUMN", num_args = 0..=1)]
        sort: Option<Option<String>>,

        /// Sort descending
        #[arg(long, requires = "sort")]
        descending: bool,

        /// csv, xlsx, json or all
        #[arg(short, long, default_value = "all")]
        format: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: TABLESMITH_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    let result = match AppConfig::from_env() {
        Ok(config) => dispatch(Cli::parse(), config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Inspect { source, rows } => {
            cmd_inspect(&source, rows.unwrap_or(config.preview_rows))
        }

        Commands::Describe { source } => cmd_describe(&source),

        Commands::Transform {
            source,
            uppercase,
            bonus,
            years_of_service,
            department,
            age_filter,
            age_min,
            age_max,
            sort,
            descending,
            format,
            out_dir,
        } => {
            let request = TransformRequest {
                uppercase: uppercase.map(|column| Uppercase { column }),
                salary_bonus: bonus,
                years_of_service,
                department: department.map(|value| DepartmentFilter { value }),
                age_range: (age_filter || age_min.is_some() || age_max.is_some()).then_some(
                    AgeFilter {
                        lower: age_min,
                        upper: age_max,
                    },
                ),
                sort: sort.map(|column| Sort {
                    column,
                    order: if descending {
                        SortOrder::Descending
                    } else {
                        SortOrder::Ascending
                    },
                }),
            };
            cmd_transform(&source, &request, &format, &out_dir, &config)
        }

        Commands::Serve { port } => {
            let config = AppConfig {
                port: port.unwrap_or(config.port),
                ..config
            };
            tablesmith::server::start_server(config).await
        }
    }
}

fn load(source: &SourceArgs) -> Result<Table, Box<dyn std::error::Error>> {
    if source.sample {
        eprintln!("📄 Loading sample employee data");
        return Ok(sample_table()?);
    }

    let input = source
        .input
        .as_deref()
        .ok_or("No input file given (pass a CSV path or --sample)")?;
    eprintln!("📄 Loading: {}", input.display());

    let result = parse_file(input, &LoadOptions::with_delimiter(source.delimiter))?;
    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(result.delimiter));
    Ok(result.table)
}

fn cmd_inspect(source: &SourceArgs, rows: usize) -> Result<(), Box<dyn std::error::Error>> {
    let table = load(source)?;
    eprintln!(
        "✅ {} rows × {} columns\n",
        table.row_count(),
        table.column_count()
    );

    println!("Columns:");
    for column in table.columns() {
        println!("  {:<24} {:?}", column.name(), column.dtype());
    }

    println!("\nPreview:");
    print_table(&table.head(rows));

    let options = controls(&table);
    println!("\nOptions:");
    println!("  Text columns: {}", or_none(&options.text_columns));
    println!("  Departments:  {}", or_none(&options.departments));
    match options.age_bounds {
        Some(b) => println!("  Age range:    {} - {}", b.min, b.max),
        None => println!("  Age range:    (none)"),
    }
    Ok(())
}

fn cmd_describe(source: &SourceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let table = load(source)?;
    let summary = describe(&table);
    if summary.is_empty() {
        eprintln!("⚠️  No numeric columns");
        return Ok(());
    }

    println!(
        "{:<20} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
    for s in summary {
        println!(
            "{:<20} {:>6} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
            s.column,
            s.count,
            stat(s.mean),
            stat(s.std),
            stat(s.min),
            stat(s.p25),
            stat(s.p50),
            stat(s.p75),
            stat(s.max)
        );
    }
    Ok(())
}

fn cmd_transform(
    source: &SourceArgs,
    request: &TransformRequest,
    format: &str,
    out_dir: &Path,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let formats: Vec<ExportFormat> = if format.eq_ignore_ascii_case("all") {
        ExportFormat::ALL.to_vec()
    } else {
        vec![format.parse()?]
    };

    let table = load(source)?;
    eprintln!(
        "   Rows: {}, Columns: {}",
        table.row_count(),
        table.column_names().join(", ")
    );

    eprintln!("\n⚙️  Transforming");
    let result = run(&table, request)?;

    println!();
    print_table(&result.table.head(config.preview_rows));

    fs::create_dir_all(out_dir)?;
    let payloads = if formats.len() == ExportFormat::ALL.len() {
        export_all(&result.table, &config.export_basename)?
    } else {
        formats
            .into_iter()
            .map(|f| export_named(&result.table, f, &config.export_basename))
            .collect::<Result<Vec<_>, _>>()?
    };

    for payload in payloads {
        let path = out_dir.join(&payload.file_name);
        fs::write(&path, &payload.bytes)?;
        eprintln!("💾 Output written to: {}", path.display());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

/// Plain-text grid of a (small) table.
fn print_table(table: &Table) {
    let names = table.column_names();
    let rows: Vec<Vec<String>> = table
        .rows()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect();

    let widths: Vec<usize> = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            rows.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", line(&names));
    for row in &rows {
        println!("{}", line(row));
    }
}

fn stat(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".into())
}

fn or_none(values: &[String]) -> String {
    if values.is_empty() {
        "(none)".to_string()
    } else {
        values.join(", ")
    }
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}
