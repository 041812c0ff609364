//! kbimport CLI - Import CSV files into the transport knowledge base
//!
//! # Main Commands
//!
//! ```bash
//! kbimport serve                     # Start HTTP server (port 3000)
//! kbimport import documents.csv     # Import a CSV into the knowledge base
//! kbimport validate documents.csv   # Check a CSV without importing
//! kbimport mappings list            # Manage saved column mappings
//! ```
//!
//! # Other Commands
//!
//! ```bash
//! kbimport parse documents.csv      # Parse CSV to JSON (columns + rows)
//! kbimport template                 # Print the CSV template
//! kbimport export -o backup.csv     # Export stored documents as CSV
//! ```

use clap::{Parser, Subcommand};
use kbimport::{
    export_csv, parse_file, preview, run_import, template_csv, CancelToken, ColumnMapping,
    Config, ConflictResolution, DocumentStore, ImportExecutor, ImportRequest, ImportSettings,
    MappingRegistry, Severity, TEMPLATE_FILE_NAME,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kbimport")]
#[command(about = "Import CSV files into the transport knowledge base", long_about = None)]
struct Cli {
    /// Data directory (overrides KB_IMPORT_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `validate` and `import`
#[derive(clap::Args)]
struct MappingArgs {
    /// Mapping JSON file (field key -> column); auto-detected if omitted
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Column holding the document ID
    #[arg(long)]
    id_column: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output columns and rows as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Map and validate a CSV file without importing it
    Validate {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        mapping: MappingArgs,
    },

    /// Import a CSV file into the knowledge base
    Import {
        /// Input CSV file
        input: PathBuf,

        #[command(flatten)]
        mapping: MappingArgs,

        /// What to do with documents that already exist: overwrite, new, skip, merge
        #[arg(short, long, default_value = "skip")]
        policy: ConflictResolution,

        /// Rows per existence lookup
        #[arg(long, default_value = "100")]
        batch_size: usize,

        /// Skip validation
        #[arg(long)]
        no_validate: bool,

        /// Stop at the first invalid row instead of skipping it
        #[arg(long)]
        strict: bool,

        /// Do not back up the store before writing
        #[arg(long)]
        no_backup: bool,

        /// Plan the import without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Ignore saved mappings
        #[arg(long)]
        no_saved_mappings: bool,

        /// Do not save the mapping after the import
        #[arg(long)]
        no_save_mapping: bool,

        /// Pause before each row, in milliseconds (overrides KB_IMPORT_ROW_DELAY_MS)
        #[arg(long)]
        row_delay_ms: Option<u64>,

        /// Write the import result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the CSV template
    Template {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export stored documents as CSV
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage saved column mappings
    Mappings {
        #[command(subcommand)]
        action: MappingAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides KB_IMPORT_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum MappingAction {
    /// List all saved mappings
    List,

    /// Import a mapping JSON file
    Import {
        /// Mapping JSON file to import
        file: PathBuf,
        /// Name for the mapping
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a mapping
    Show {
        /// Mapping ID
        id: String,
    },

    /// Delete a mapping
    Delete {
        /// Mapping ID
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match Config::from_env() {
        Ok(config) => {
            let config = match cli.data_dir {
                Some(dir) => config.with_data_dir(dir),
                None => config,
            };
            run(cli.command, config).await
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Validate { input, mapping } => cmd_validate(&input, &mapping, &config),

        Commands::Import {
            input,
            mapping,
            policy,
            batch_size,
            no_validate,
            strict,
            no_backup,
            dry_run,
            no_saved_mappings,
            no_save_mapping,
            row_delay_ms,
            output,
        } => {
            let settings = ImportSettings {
                conflict_resolution: policy,
                document_id_column: mapping.id_column.clone(),
                validate_data: !no_validate,
                skip_invalid_rows: !strict,
                create_backup: !no_backup,
                batch_size,
            };
            let request = ImportRequest {
                file_name: file_name(&input),
                mapping: load_mapping(mapping.mapping.as_deref())?,
                settings,
                use_saved_mappings: !no_saved_mappings,
                save_mapping: !no_save_mapping,
                dry_run,
            };
            let delay = row_delay_ms.map(Duration::from_millis).unwrap_or(config.row_delay());
            cmd_import(&input, request, delay, output.as_deref(), &config).await
        }

        Commands::Template { output } => {
            let csv = template_csv()?;
            write_output(&csv, output.as_deref())?;
            if output.is_none() {
                eprintln!("💡 Save as {} and fill one row per document", TEMPLATE_FILE_NAME);
            }
            Ok(())
        }

        Commands::Export { output } => cmd_export(output.as_deref(), &config),

        Commands::Mappings { action } => cmd_mappings(action, &config),

        Commands::Serve { port } => {
            let config = Config {
                port: port.unwrap_or(config.port),
                ..config
            };
            kbimport::server::start_server(config).await
        }
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_file(input)?;

    eprintln!("   Encoding: {}", result.info.encoding);
    eprintln!("   Delimiter: '{}' (auto-detected)", format_delimiter(result.info.delimiter));
    for column in &result.csv.columns {
        eprintln!("   Column: {} ({})", column.name, column.column_type);
    }
    eprintln!("✅ Parsed {} rows", result.csv.rows.len());

    let json = serde_json::to_string_pretty(&json!({
        "columns": result.csv.columns,
        "rows": result.csv.rows,
    }))?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_validate(
    input: &Path,
    args: &MappingArgs,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let bytes = fs::read(input)?;
    let registry = MappingRegistry::in_data_dir(&config.data_dir);
    let settings = ImportSettings {
        document_id_column: args.id_column.clone(),
        ..Default::default()
    };

    let output = preview(
        &bytes,
        &file_name(input),
        load_mapping(args.mapping.as_deref())?,
        settings,
        &registry,
    )?;

    eprintln!("   Rows: {}", output.csv_info.row_count);
    for (field, column) in output.mapping.mapped() {
        eprintln!("   {} ← {}", field, column);
    }
    for label in &output.report.unmapped_required {
        eprintln!("   ⚠️  Required field '{}' is not mapped", label);
    }

    for row in output.report.rows.iter().take(10) {
        eprintln!("\n   Row {}:", row.row_index);
        for err in &row.errors {
            eprintln!("     ❌ {}", err);
        }
        for warning in &row.warnings {
            eprintln!("     ⚠️  {}", warning);
        }
    }

    eprintln!(
        "\n📊 Results: {} error(s) in {} row(s), {} warning(s)",
        output.report.error_count,
        output.report.invalid_rows(),
        output.report.warning_count
    );

    if !output.report.is_valid() {
        std::process::exit(1);
    }

    Ok(())
}

async fn cmd_import(
    input: &Path,
    request: ImportRequest,
    row_delay: Duration,
    output: Option<&Path>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing: {}", input.display());

    let bytes = fs::read(input)?;
    let mut store = DocumentStore::with_dir(&config.data_dir);
    let mut registry = MappingRegistry::in_data_dir(&config.data_dir);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let executor = ImportExecutor::new(row_delay).with_progress(tx);
    let progress = tokio::spawn(async move {
        let mut last_decile = 0;
        while let Some(p) = rx.recv().await {
            let decile = (p.percent / 10.0) as u32;
            if decile > last_decile {
                last_decile = decile;
                eprintln!("   ⏳ {}/{} rows ({:.0}%)", p.handled, p.total, p.percent);
            }
        }
    });

    let cancel = CancelToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Cancelling after the current row...");
            on_ctrl_c.cancel();
        }
    });

    let result = run_import(&bytes, request, &mut store, &mut registry, &executor, &cancel).await;
    drop(executor);
    let _ = progress.await;
    let result = result?;

    let r = &result.result;
    eprintln!("\n📊 Import summary");
    eprintln!("   Total rows:    {}", r.total_rows);
    eprintln!("   New:           {}", r.new_records);
    eprintln!("   Updated:       {}", r.updated_records);
    eprintln!("   Skipped:       {}", r.skipped_rows);
    eprintln!("   Errors:        {}", r.error_count());
    if r.cancelled {
        eprintln!("   ⚠️  Cancelled before the end of the file");
    }
    if let Some(ref id) = result.mapping_id {
        eprintln!("   Mapping:       {}", id);
    }
    if let Some(ref path) = result.backup_path {
        eprintln!("   Backup:        {}", path.display());
    }

    for issue in r.errors.iter().take(10) {
        let icon = match issue.severity {
            Severity::Error => "❌",
            Severity::Warning => "⚠️ ",
        };
        eprintln!("   {} Row {}: {}", icon, issue.row, issue.message);
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result)?;
        write_output(&json, Some(path))?;
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_export(output: Option<&Path>, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = DocumentStore::with_dir(&config.data_dir);
    eprintln!("📦 Exporting {} document(s)", store.len());

    let csv = export_csv(store.list())?;
    write_output(&csv, output)?;
    Ok(())
}

fn cmd_mappings(action: MappingAction, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = MappingRegistry::in_data_dir(&config.data_dir);

    match action {
        MappingAction::List => {
            let mappings = registry.list();
            if mappings.is_empty() {
                eprintln!("📋 No mappings saved yet.");
                eprintln!("   Use 'kbimport mappings import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Saved mappings ({}):\n", mappings.len());
            for m in mappings {
                println!("  📄 {} ({})", m.name, m.id);
                println!("     Columns: {}", m.csv_columns.join(", "));
                println!("     Success rate: {:.0}%", m.success_rate * 100.0);
                println!("     Uses: {}", m.use_count);
                if let Some(ref last) = m.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        MappingAction::Import { file, name } => {
            eprintln!("📥 Importing mapping from: {}", file.display());
            let id = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Mapping saved with ID: {}", id);
        }

        MappingAction::Show { id } => {
            let m = registry
                .get(&id)
                .ok_or_else(|| format!("Mapping not found: {}", id))?;
            println!("📄 Mapping: {} ({})\n", m.name, m.id);
            println!("CSV Columns: {}", m.csv_columns.join(", "));
            println!("Created: {}", m.created_at);
            println!("Success rate: {:.0}%", m.success_rate * 100.0);
            println!("Uses: {}", m.use_count);
            println!("\nMapping:");
            println!("{}", m.mapping.to_json()?);
        }

        MappingAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️  Mapping deleted: {}", id);
        }
    }

    Ok(())
}

fn load_mapping(path: Option<&Path>) -> Result<Option<ColumnMapping>, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(Some(ColumnMapping::from_json(&fs::read_to_string(p)?)?)),
        None => Ok(None),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload.csv")
        .to_string()
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
