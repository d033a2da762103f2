use clap::{Parser, Subcommand, ValueEnum};
use cuelog::api::run_api_server;
use cuelog::cli;
use cuelog::config::AppConfig;
use cuelog::types::{ExportFormat, TemplateLayout};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cuelog")]
#[command(about = "Cue sheet marker logging: template-preserving Excel/CSV export")]
#[command(long_about = "Cuelog - video cue sheet logging backend

Parses cue sheet templates (.xlsx, .xls, .csv) into metadata, header and data,
and regenerates them from time-coded markers with the template's formatting.

COMMANDS:
  parse   - Parse a cue sheet template to JSON
  export  - Export markers (JSON export request) to .xlsx or .csv
  serve   - Run the HTTP API server

EXAMPLES:
  cuelog parse episode_07.xlsx -o template.json
  cuelog export request.json -f csv -o markers.csv
  cuelog serve --host 0.0.0.0 --port 5000")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "CUELOG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Excel,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Excel => ExportFormat::Excel,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a cue sheet template to JSON
    Parse {
        /// Template file (.xlsx, .xls or .csv)
        file: PathBuf,

        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of metadata rows above the table header
        #[arg(short, long)]
        metadata_rows: Option<usize>,

        /// Show the parsed layout
        #[arg(short, long)]
        verbose: bool,
    },

    #[command(long_about = "Export markers to a spreadsheet.

The request file uses the same JSON body as POST /api/export/{format}:
headerRows, markers, blankLines, fieldsToExport, fieldLabels, timeFormat,
metadata_with_format, table_header_format, table_row_format, column_widths.

A SEQ# column is added when absent and rows flagged yellow/red are filled.")]
    /// Export markers to .xlsx or .csv
    Export {
        /// JSON export request
        request: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "excel")]
        format: FormatArg,

        /// Output path (default: next to the request, named after the template)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show verbose export steps
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run the HTTP API server
    Serve {
        /// Host address to bind to (use 0.0.0.0 for all interfaces)
        #[arg(short = 'H', long, env = "CUELOG_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "CUELOG_PORT")]
        port: Option<u16>,
    },
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse {
            file,
            output,
            metadata_rows,
            verbose,
        } => {
            let layout = match metadata_rows {
                Some(rows) => TemplateLayout::new(rows)?,
                None => config.layout,
            };
            cli::parse(file, output, layout, verbose)?;
        }

        Commands::Export {
            request,
            format,
            output,
            verbose,
        } => cli::export(request, format.into(), output, verbose)?,

        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_api_server(config))?;
        }
    }

    Ok(())
}
