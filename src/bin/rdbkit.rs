//! CLI rdbkit
//!
//! Печать содержимого снимка RDB, сводка по ключам и проверка целостности
//! без запуска сервера.

use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use rdbkit::{
    init_logging, load_file, CallbackHandler, CountHandler, Entry, LoadOptions, LoadReport,
    LogFormat, Record, Settings, StackError, Value,
};
use serde_json::{json, Map, Value as Json};
use tracing::debug;

/// Основная структура CLI аргументов
#[derive(Parser)]
#[command(name = "rdbkit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_version = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("RDBKIT_GIT_COMMIT"),
    ", built ",
    env!("RDBKIT_BUILD_TIME"),
    ")"
))]
#[command(about = "Inspect and verify RDB snapshot files", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Файл конфигурации (toml/json/yaml)
    #[arg(long, global = true, env = "RDBKIT_CONFIG", help = "Path to a configuration file")]
    config: Option<PathBuf>,
    /// Не сверять CRC64-трейлер
    #[arg(long, global = true, help = "Read the checksum trailer but do not verify it")]
    no_verify: bool,
    /// Разрешить файл без EOF и трейлера
    #[arg(
        long,
        global = true,
        help = "Accept a snapshot that ends after the last record without EOF and trailer"
    )]
    allow_missing_trailer: bool,
    /// Подробные логи (debug)
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    /// Только warn/error
    #[arg(short, long, global = true, help = "Only log warnings and errors")]
    quiet: bool,
    /// Формат логов
    #[arg(long, global = true, value_enum, help = "Log output format")]
    log_format: Option<LogFormatArg>,
    #[command(subcommand)]
    command: Commands,
}

/// Формат вывода записей
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    /// Человекочитаемый формат
    Pretty,
    /// JSON по строке на запись
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

/// Подкоманды CLI
#[derive(Subcommand)]
enum Commands {
    /// Напечатать все записи снимка
    Dump {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "pretty")]
        output: OutputFormat,
        /// Только ключи из этой БД
        #[arg(long)]
        db: Option<u64>,
        /// Только ключи с этим префиксом
        #[arg(long)]
        prefix: Option<String>,
        /// Не печатать метаданные и служебные записи
        #[arg(long)]
        keys_only: bool,
    },
    /// Сводка по ключам, типам и БД
    #[command(alias = "stats")]
    Summary {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },
    /// Проверить структуру и контрольную сумму
    Verify {
        path: PathBuf,
        #[arg(long, value_enum, default_value = "pretty")]
        output: OutputFormat,
    },
}

impl Commands {
    fn output(&self) -> OutputFormat {
        match self {
            Commands::Dump { output, .. }
            | Commands::Summary { output, .. }
            | Commands::Verify { output, .. } => *output,
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(f: LogFormatArg) -> Self {
        match f {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Точка входа в CLI
fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<StackError>() {
                Some(stack) => report_load_error(stack, cli.command.output()),
                None => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_cli_overrides(cli, &mut settings);

    init_logging(&settings.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let options = LoadOptions::from(&settings.loader);
    debug!(?options, "load options");

    match &cli.command {
        Commands::Dump {
            path,
            output,
            db,
            prefix,
            keys_only,
        } => {
            let filter = DumpFilter {
                db: *db,
                prefix: prefix.as_deref().map(|p| Bytes::copy_from_slice(p.as_bytes())),
                keys_only: *keys_only,
            };
            dump(path, &options, *output, &filter)
        }
        Commands::Summary { path, output } => summary(path, &options, *output),
        Commands::Verify { path, output } => verify(path, &options, *output),
    }
}

fn apply_cli_overrides(
    cli: &Cli,
    settings: &mut Settings,
) {
    if cli.no_verify {
        settings.loader.verify_checksum = false;
    }
    if cli.allow_missing_trailer {
        settings.loader.allow_missing_trailer = true;
    }
    if cli.verbose {
        settings.logging.level = "debug".to_string();
    } else if cli.quiet {
        settings.logging.level = "warn".to_string();
    }
    if let Some(format) = cli.log_format {
        settings.logging.format = format.into();
    }
}

fn report_load_error(
    err: &StackError,
    output: OutputFormat,
) {
    if let OutputFormat::Json = output {
        match serde_json::to_string(&err.to_report()) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Error: {err} (report serialization failed: {e})"),
        }
        return;
    }
    eprintln!("Error: {err}");
    if let Some(hint) = err.recovery_hint() {
        eprintln!("Hint: {hint}");
    }
}

struct DumpFilter {
    db: Option<u64>,
    prefix: Option<Bytes>,
    keys_only: bool,
}

impl DumpFilter {
    fn accepts(
        &self,
        record: &Record,
    ) -> bool {
        match record {
            Record::KeyValue(entry) => {
                self.db.map_or(true, |db| db == entry.db)
                    && self
                        .prefix
                        .as_ref()
                        .map_or(true, |p| entry.key.starts_with(p))
            }
            _ => !self.keys_only,
        }
    }
}

fn dump(
    path: &Path,
    options: &LoadOptions,
    output: OutputFormat,
    filter: &DumpFilter,
) -> Result<()> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut handler = CallbackHandler::new(|record: Record| {
        if !filter.accepts(&record) {
            return Ok(());
        }
        let line = match output {
            OutputFormat::Pretty => format_record(&record),
            OutputFormat::Json => record_to_json(&record).to_string(),
        };
        writeln!(out, "{line}")?;
        Ok(())
    });

    let report = load_file(path, options, &mut handler)?;
    drop(handler);
    out.flush()?;

    if matches!(output, OutputFormat::Pretty) {
        eprintln!("{}", format_report(&report));
    }
    Ok(())
}

fn summary(
    path: &Path,
    options: &LoadOptions,
    output: OutputFormat,
) -> Result<()> {
    let mut counter = CountHandler::new();
    let report = load_file(path, options, &mut counter)?;

    match output {
        OutputFormat::Json => {
            let metadata: Map<String, Json> = counter
                .metadata()
                .iter()
                .map(|(k, v)| (lossy(k), Json::String(lossy(v))))
                .collect();
            let per_type: Map<String, Json> = ["string", "list", "set", "zset", "hash"]
                .iter()
                .map(|t| (t.to_string(), json!(counter.count_of(t))))
                .collect();
            let per_db: Map<String, Json> = counter
                .keys_per_db()
                .into_iter()
                .map(|(db, n)| (db.to_string(), json!(n)))
                .collect();
            let doc = json!({
                "report": report,
                "metadata": metadata,
                "keys": counter.total_keys(),
                "expires": counter.expires(),
                "avg_key_length": counter.avg_key_length(),
                "types": per_type,
                "databases": per_db,
            });
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        OutputFormat::Pretty => {
            println!("{}", format_report(&report));
            for (k, v) in counter.metadata() {
                println!("  {:<16} {}", lossy(k), lossy(v));
            }
            println!("keys: {} ({} with expiry)", counter.total_keys(), counter.expires());
            for t in ["string", "list", "set", "zset", "hash"] {
                let n = counter.count_of(t);
                if n > 0 {
                    println!("  {t:<8} {n}");
                }
            }
            for (db, n) in counter.keys_per_db() {
                println!("  db{db:<6} {n}");
            }
            println!("avg key length: {:.1}", counter.avg_key_length());
        }
    }
    Ok(())
}

fn verify(
    path: &Path,
    options: &LoadOptions,
    output: OutputFormat,
) -> Result<()> {
    let mut counter = CountHandler::new();
    let report = load_file(path, options, &mut counter)?;
    match output {
        OutputFormat::Pretty => println!("OK: {}", format_report(&report)),
        OutputFormat::Json => println!("{}", json!({ "ok": true, "report": report })),
    }
    Ok(())
}

fn format_report(report: &LoadReport) -> String {
    format!(
        "RDB version {}, {} records, {} bytes, checksum {:?}, {} ms",
        report.version,
        report.stats.records,
        report.stats.bytes_read,
        report.checksum,
        report.elapsed.as_millis()
    )
}

fn lossy(b: &Bytes) -> String {
    String::from_utf8_lossy(b).into_owned()
}

fn format_record(record: &Record) -> String {
    match record {
        Record::Metadata { key, value } => format!("AUX {} = {:?}", lossy(key), lossy(value)),
        Record::SelectDb { index } => format!("SELECTDB {index}"),
        Record::ResizeHint {
            db_size,
            expires_size,
        } => format!("RESIZEDB keys={db_size} expires={expires_size}"),
        Record::SlotInfo {
            slot_id,
            slot_size,
            expires_slot_size,
        } => format!("SLOTINFO slot={slot_id} keys={slot_size} expires={expires_slot_size}"),
        Record::Function { code } => format!("FUNCTION {} bytes", code.len()),
        Record::KeyValue(entry) => format_entry(entry),
    }
}

fn format_entry(entry: &Entry) -> String {
    let mut line = format!(
        "db={} {} {:?} => {}",
        entry.db,
        entry.value.type_name(),
        lossy(&entry.key),
        format_value(&entry.value)
    );
    if let Some(expiry) = entry.expiry {
        match expiry.to_datetime() {
            Some(at) => line.push_str(&format!(" expires={}", at.to_rfc3339())),
            None => line.push_str(&format!(" expires_ms={}", expiry.as_millis())),
        }
    }
    if let Some(idle) = entry.idle {
        line.push_str(&format!(" idle={idle}"));
    }
    if let Some(freq) = entry.freq {
        line.push_str(&format!(" freq={freq}"));
    }
    line
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{:?}", lossy(s)),
        Value::List(items) | Value::Set(items) => {
            let parts: Vec<String> = items.iter().map(|i| format!("{:?}", lossy(i))).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::SortedSet(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(|(m, s)| format!("{:?}: {}", lossy(m), s))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Hash(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = fields
                .into_iter()
                .map(|(f, v)| format!("{:?}: {:?}", lossy(f), lossy(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

fn record_to_json(record: &Record) -> Json {
    match record {
        Record::Metadata { key, value } => {
            let mut aux = Map::new();
            aux.insert(lossy(key), Json::String(lossy(value)));
            json!({ "aux": aux })
        }
        Record::SelectDb { index } => json!({"select_db": index}),
        Record::ResizeHint {
            db_size,
            expires_size,
        } => json!({"resize_db": {"db_size": db_size, "expires_size": expires_size}}),
        Record::SlotInfo {
            slot_id,
            slot_size,
            expires_slot_size,
        } => json!({"slot_info": {
            "slot_id": slot_id,
            "slot_size": slot_size,
            "expires_slot_size": expires_slot_size,
        }}),
        Record::Function { code } => json!({"function": lossy(code)}),
        Record::KeyValue(entry) => json!({
            "db": entry.db,
            "key": lossy(&entry.key),
            "type": entry.value.type_name(),
            "encoding": format!("{:?}", entry.value_type),
            "value": value_to_json(&entry.value),
            "expires_ms": entry.expiry.map(|e| e.as_millis()),
            "idle": entry.idle,
            "freq": entry.freq,
        }),
    }
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Str(s) => Json::String(lossy(s)),
        Value::List(items) | Value::Set(items) => {
            Json::Array(items.iter().map(|i| Json::String(lossy(i))).collect())
        }
        Value::SortedSet(items) => Json::Array(
            items
                .iter()
                .map(|(m, s)| {
                    // NaN и бесконечности не представимы в JSON числом
                    let score = serde_json::Number::from_f64(s.0)
                        .map(Json::Number)
                        .unwrap_or_else(|| Json::String(s.0.to_string()));
                    json!([lossy(m), score])
                })
                .collect(),
        ),
        Value::Hash(map) => Json::Object(
            map.iter()
                .map(|(f, v)| (lossy(f), Json::String(lossy(v))))
                .collect(),
        ),
    }
}
