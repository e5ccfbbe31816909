//! Command line front end over the ballistic-tools library.

use std::io;
use std::path::PathBuf;

use ballistic_tools::aggregate::{CHECKPOINT_LABELS, Report, StatRow};
use ballistic_tools::config::AppConfig;
use ballistic_tools::database::Database;
use ballistic_tools::model::{Condition, OrderRef};
use ballistic_tools::store::{DateRange, OrderFilter, parse_order_ids};
use ballistic_tools::versions::{LimitAssignment, LimitCategory};
use ballistic_tools::workplace::{ConditionFilter, Workplace};
use ballistic_tools::{Result, ToolError};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }
    if let Some(folder) = cli.excel_folder {
        config.excel_folder = folder;
    }

    let database = Database::open(&config, Local::now().naive_local());
    match cli.command {
        Command::Import { orders } => {
            let summary = database.import_files(&parse_order_ids(&orders), &config.excel_folder)?;
            for warning in &summary.warnings {
                warn!("{warning}");
            }
            println!("{summary}");
        }
        Command::Remove { orders } => {
            println!("{}", database.remove_orders(&parse_order_ids(&orders))?);
        }
        Command::List(args) => execute_list(&database, args)?,
        Command::Show { version, order } => {
            let record = database.get_metadata(&version, &order)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Report(args) => execute_report(&database, &config, args)?,
        Command::ExportDb => {
            let path = database.export_database(&config.report_dir, Local::now().naive_local())?;
            println!("Database exported to {}", path.display());
        }
        Command::Versions { command } => execute_versions(&database, command)?,
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn execute_list(database: &Database, args: ListArgs) -> Result<()> {
    let dates = match (args.from, args.to, args.last_days) {
        (Some(start), Some(end), _) => Some(DateRange::new(start, end)?),
        (None, None, Some(days)) => Some(DateRange::last_days(Local::now().date_naive(), days)),
        (None, None, None) => None,
        _ => {
            return Err(ToolError::Input(
                "Both --from and --to are required for a custom range.".into(),
            ));
        }
    };
    let filter = OrderFilter {
        version: args.version,
        dates,
    };

    let listing = database.list_orders(&filter)?;
    for summary in &listing.orders {
        println!(
            "{} | {}",
            summary.order_ref,
            summary.test_date.as_deref().unwrap_or("N/A")
        );
    }
    println!("Versions: {}", listing.versions.join(", "));
    Ok(())
}

fn execute_report(database: &Database, config: &AppConfig, args: ReportArgs) -> Result<()> {
    let store = database.load()?;
    let mut workplace = Workplace::new();
    let transfer = workplace.send_to_workplace(&store, &args.orders)?;
    println!("{transfer}");

    let outcome = workplace.apply_filters(
        &ConditionFilter::from_conditions(&args.conditions),
        args.limit,
    )?;
    if let Some(warning) = outcome.warning {
        println!("{warning}");
    }
    for record in workplace.view() {
        println!("{record}");
    }
    println!("{}", outcome.counts);

    let report = database.report(workplace.report_records()?)?;
    let report = if args.all_points {
        report
    } else {
        report.first_columns(CHECKPOINT_LABELS.len())
    };
    print_report(&report);

    if args.export {
        let path = database.export_report(&report, &config.report_dir, Local::now().naive_local())?;
        println!("Report exported to {}", path.display());
    }
    Ok(())
}

fn print_report(report: &Report) {
    for condition in &report.conditions {
        println!();
        println!(
            "{} | Version: {} | Total Inflators: {}",
            condition.condition, condition.version, condition.total_records
        );
        let mut header = vec![String::new()];
        header.extend(condition.column_labels());
        println!("{}", header.join(" | "));
        for row in StatRow::ALL {
            println!("{}", condition.row_cells(row).join(" | "));
        }
    }
}

fn execute_versions(database: &Database, command: VersionsCommand) -> Result<()> {
    match command {
        VersionsCommand::List => {
            for name in database.list_versions()? {
                println!("{name}");
            }
        }
        VersionsCommand::Show { name } => {
            let limits = database.get_version(&name)?;
            for (condition, table) in &limits {
                for category in LimitCategory::ALL {
                    let values: Vec<String> = table
                        .category(category)
                        .iter()
                        .map(|(checkpoint, value)| format!("{}={value}", checkpoint.as_str()))
                        .collect();
                    println!("{condition} {}: {}", category.as_str(), values.join(" "));
                }
            }
        }
        VersionsCommand::Set { name, limits } => {
            println!("{}", database.save_version(&name, &limits)?);
        }
        VersionsCommand::Delete { name } => {
            println!("{}", database.delete_version(&name)?);
        }
    }
    Ok(())
}

fn parse_arg<T>(value: &str) -> std::result::Result<T, String>
where
    T: std::str::FromStr<Err = ToolError>,
{
    value.parse().map_err(|error: ToolError| error.to_string())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Import ballistic test workbooks into a JSON store and report on them."
)]
struct Cli {
    /// JSON configuration file with paths and the sheet layout.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store file, overriding the configuration.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Folder searched for order workbooks, overriding the configuration.
    #[arg(long, global = true)]
    excel_folder: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import the workbooks of a comma separated order list.
    Import { orders: String },

    /// Remove a comma separated order list from every version.
    Remove { orders: String },

    /// List stored orders, newest test date first.
    List(ListArgs),

    /// Print the stored record of one order.
    Show { version: String, order: String },

    /// Load orders into a workplace and print their statistics.
    Report(ReportArgs),

    /// Export every stored test to a workbook in the report directory.
    ExportDb,

    /// Manage per-version limit tables.
    Versions {
        #[command(subcommand)]
        command: VersionsCommand,
    },
}

#[derive(clap::Args)]
struct ListArgs {
    /// Version tag, or "All".
    #[arg(long)]
    version: Option<String>,

    /// First test date of a custom range (YYYY-MM-DD).
    #[arg(long, requires = "to", conflicts_with = "last_days")]
    from: Option<NaiveDate>,

    /// Last test date of a custom range (YYYY-MM-DD).
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Range ending today, e.g. 30, 60 or 90.
    #[arg(long)]
    last_days: Option<u64>,
}

#[derive(clap::Args)]
struct ReportArgs {
    /// Orders as VERSION/ORDER.
    #[arg(required = true, value_parser = parse_arg::<OrderRef>)]
    orders: Vec<OrderRef>,

    /// Keep only these conditions; all when omitted.
    #[arg(long = "condition", value_parser = parse_arg::<Condition>)]
    conditions: Vec<Condition>,

    /// Keep the first N records after condition filtering.
    #[arg(long)]
    limit: Option<usize>,

    /// Also write the report workbook.
    #[arg(long)]
    export: bool,

    /// Show every time offset instead of the six checkpoint columns.
    #[arg(long)]
    all_points: bool,
}

#[derive(Subcommand)]
enum VersionsCommand {
    /// List version names.
    List,

    /// Print a version's limit table.
    Show { name: String },

    /// Create or update a version; limits as CONDITION.CATEGORY.CHECKPOINT=VALUE.
    Set {
        name: String,
        #[arg(value_parser = parse_arg::<LimitAssignment>)]
        limits: Vec<LimitAssignment>,
    },

    /// Delete a version.
    Delete { name: String },
}
