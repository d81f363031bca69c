//! Загрузка снимка целиком: открыть источник, прочитать заголовок, отдать
//! все записи обработчику, проверить трейлер.
//!
//! Источник освобождается на любом пути завершения: и при успехе, и при
//! ошибке, в том числе при отказе обработчика.

use std::{
    fs::File,
    io::Read,
    path::Path,
    time::{Duration, Instant},
};

use rdbkit_error::{LogLevel, RdbResult, ResultExt, StackError};
use serde::Serialize;
use tracing::{debug, error, info, info_span, trace, warn};

use super::{
    checksum::ChecksumStatus,
    decode::DecodeLimits,
    file::RdbVersion,
    source::DEFAULT_READ_BUFFER,
    streaming::{LoadEvent, ParseStats, RdbParser, RecordHandler, TrailerPolicy},
};

/// Параметры загрузки.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Сравнивать CRC64-трейлер с вычисленной суммой
    pub verify_checksum: bool,
    /// Разрешить конец файла без `EOF` и трейлера (RDB 5+)
    pub allow_missing_trailer: bool,
    /// Пределы длин строк и коллекций
    pub limits: DecodeLimits,
    /// Размер буфера чтения
    pub read_buffer: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            allow_missing_trailer: false,
            limits: DecodeLimits::default(),
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl LoadOptions {
    /// Правила обработки трейлера.
    pub fn trailer_policy(&self) -> TrailerPolicy {
        TrailerPolicy {
            verify: self.verify_checksum,
            allow_missing: self.allow_missing_trailer,
        }
    }
}

/// Итог успешной загрузки.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub version: RdbVersion,
    pub checksum: ChecksumStatus,
    pub stats: ParseStats,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

/// Загружает снимок из файла.
pub fn load_file<P, H>(
    path: P,
    options: &LoadOptions,
    handler: &mut H,
) -> RdbResult<LoadReport>
where
    P: AsRef<Path>,
    H: RecordHandler,
{
    let path = path.as_ref();
    let span = info_span!("rdb_load", path = %path.display());
    let _guard = span.enter();

    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    load_reader(file, options, handler).with_context(|| format!("loading {}", path.display()))
}

/// Загружает снимок из произвольного источника байт.
pub fn load_reader<R, H>(
    reader: R,
    options: &LoadOptions,
    handler: &mut H,
) -> RdbResult<LoadReport>
where
    R: Read,
    H: RecordHandler,
{
    let started = Instant::now();
    let mut parser = RdbParser::with_buffer(reader, options.read_buffer, options.limits);

    match drive(&mut parser, options, handler, started) {
        Ok(report) => {
            info!(
                version = %report.version,
                keys = report.stats.keys,
                bytes = report.stats.bytes_read,
                checksum = ?report.checksum,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "snapshot loaded"
            );
            Ok(report)
        }
        Err(err) => {
            log_failure(&err, parser.offset());
            Err(err)
        }
    }
}

fn drive<R, H>(
    parser: &mut RdbParser<R>,
    options: &LoadOptions,
    handler: &mut H,
    started: Instant,
) -> RdbResult<LoadReport>
where
    R: Read,
    H: RecordHandler,
{
    let version = parser.read_header()?;
    debug!(%version, "header accepted");
    handler.handle_event(LoadEvent::Header { version })?;

    while let Some(record) = parser.next_record()? {
        trace!(kind = record.kind_name(), offset = parser.offset(), "record");
        handler.handle_event(LoadEvent::Record(record))?;
    }

    let checksum = parser.finish(options.trailer_policy())?;
    handler.handle_event(LoadEvent::End { checksum })?;
    handler.finalize()?;

    Ok(LoadReport {
        version,
        checksum,
        stats: parser.stats().clone(),
        elapsed: started.elapsed(),
    })
}

fn log_failure(
    err: &StackError,
    offset: u64,
) {
    let kind = err.rdb_kind().map(|k| format!("{k:?}"));
    match err.log_level() {
        LogLevel::Error => error!(error = %err, ?kind, offset, "snapshot load failed"),
        LogLevel::Warn => warn!(error = %err, ?kind, offset, "snapshot load failed"),
        _ => info!(error = %err, ?kind, offset, "snapshot load failed"),
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        d: &Duration,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
