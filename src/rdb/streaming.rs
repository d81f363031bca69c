//! Потоковый разбор снимка RDB.
//!
//! [`RdbParser`] читает снимок по одной записи и никогда не держит в памяти
//! больше одного значения. Управляющие опкоды `EXPIRETIME*`, `IDLE` и `FREQ`
//! не порождают записей: они запоминаются и прикрепляются к следующей паре
//! ключ/значение.
//!
//! # События
//!
//! Загрузчик передаёт обработчику [`RecordHandler`]:
//! - `Header` — заголовок прочитан, известна версия;
//! - `Record` — очередная логическая запись;
//! - `End` — поток и трейлер разобраны, итог проверки CRC64.

use std::{collections::HashMap, io::Read};

use bytes::Bytes;
use rdbkit_error::{RdbError, RdbResult, StackError};
use serde::Serialize;

use super::{
    checksum::{verify_trailer, ChecksumStatus},
    decode::{read_string, read_value, DecodeLimits},
    file::{RdbVersion, RDB_MAGIC, RDB_VERSION_DIGITS},
    length::read_plain_length,
    source::ByteSource,
    tags::{Opcode, ValueType},
    Entry, Expiry, Record,
};

/// Трейт для обработки событий загрузки.
pub trait RecordHandler {
    /// Вызывается для каждого события. Ошибка прерывает загрузку и
    /// возвращается вызывающему коду без изменений.
    fn handle_event(
        &mut self,
        event: LoadEvent,
    ) -> RdbResult<()>;

    /// Вызывается один раз после события `End`.
    fn finalize(&mut self) -> RdbResult<()> {
        Ok(())
    }
}

/// События, генерируемые загрузчиком.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// Заголовок прочитан
    Header { version: RdbVersion },
    /// Очередная запись
    Record(Record),
    /// Конец потока (успешное завершение)
    End { checksum: ChecksumStatus },
}

/// Статистика разбора снимка.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    /// Кол-во байт прочитано (включая трейлер)
    pub bytes_read: u64,
    /// Кол-во отданных записей всех видов
    pub records: u64,
    /// Кол-во пар ключ/значение
    pub keys: u64,
    /// Кол-во ключей со временем истечения
    pub keys_with_expiry: u64,
    /// Кол-во записей метаданных
    pub metadata: u64,
    /// Кол-во переключений БД
    pub db_selects: u64,
    /// Версия снимка
    pub version: Option<RdbVersion>,
}

/// Правила обработки трейлера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerPolicy {
    /// Сравнивать трейлер с вычисленной суммой
    pub verify: bool,
    /// Считать конец файла без опкода `EOF` и трейлера нормальным
    /// завершением (для версий с трейлером)
    pub allow_missing: bool,
}

impl Default for TrailerPolicy {
    fn default() -> Self {
        Self {
            verify: true,
            allow_missing: false,
        }
    }
}

/// Как закончился поток записей.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    /// Прочитан опкод `EOF`
    Marker,
    /// Источник закончился на границе записи
    EndOfInput,
}

/// Метаданные, ожидающие следующего ключа.
#[derive(Debug, Default)]
struct PendingMeta {
    expiry: Option<Expiry>,
    idle: Option<u64>,
    freq: Option<u8>,
}

impl PendingMeta {
    fn is_empty(&self) -> bool {
        self.expiry.is_none() && self.idle.is_none() && self.freq.is_none()
    }
}

/// Потоковый парсер снимка.
pub struct RdbParser<R: Read> {
    source: ByteSource<R>,
    limits: DecodeLimits,
    version: Option<RdbVersion>,
    db: u64,
    pending: PendingMeta,
    stats: ParseStats,
    end: Option<StreamEnd>,
}

impl<R: Read> RdbParser<R> {
    /// Создаёт парсер с буфером по умолчанию.
    pub fn new(
        reader: R,
        limits: DecodeLimits,
    ) -> Self {
        Self::from_source(ByteSource::new(reader), limits)
    }

    /// Создаёт парсер с буфером чтения заданного размера.
    pub fn with_buffer(
        reader: R,
        capacity: usize,
        limits: DecodeLimits,
    ) -> Self {
        Self::from_source(ByteSource::with_capacity(capacity, reader), limits)
    }

    fn from_source(
        source: ByteSource<R>,
        limits: DecodeLimits,
    ) -> Self {
        Self {
            source,
            limits,
            version: None,
            db: 0,
            pending: PendingMeta::default(),
            stats: ParseStats::default(),
            end: None,
        }
    }

    /// Читает и проверяет заголовок. Повторный вызов возвращает уже
    /// прочитанную версию.
    pub fn read_header(&mut self) -> RdbResult<RdbVersion> {
        if let Some(version) = self.version {
            return Ok(version);
        }
        let mut magic = Vec::with_capacity(RDB_MAGIC.len());
        while magic.len() < RDB_MAGIC.len() {
            magic.push(self.source.read_u8("reading magic")?);
            RdbVersion::check_magic(&magic)?;
        }
        let digits = self
            .source
            .read_array::<RDB_VERSION_DIGITS>("reading version")?;
        let version = RdbVersion::parse(&digits)?;
        self.version = Some(version);
        self.stats.version = Some(version);
        self.sync_offset();
        Ok(version)
    }

    /// Возвращает следующую запись или `None`, если поток записей
    /// закончился.
    pub fn next_record(&mut self) -> RdbResult<Option<Record>> {
        self.read_header()?;
        if self.end.is_some() {
            return Ok(None);
        }

        let record = loop {
            let offset = self.source.offset();
            let Some(byte) = self.source.next_opcode()? else {
                if !self.pending.is_empty() {
                    return Err(RdbError::truncated("expecting key after key metadata", offset).into());
                }
                self.end = Some(StreamEnd::EndOfInput);
                self.sync_offset();
                return Ok(None);
            };

            if let Ok(opcode) = Opcode::try_from(byte) {
                match self.read_opcode(opcode, offset)? {
                    Some(record) => break record,
                    None if self.end.is_some() => {
                        self.sync_offset();
                        return Ok(None);
                    }
                    None => continue,
                }
            }

            let value_type = ValueType::try_from(byte).map_err(|_| RdbError::UnsupportedType {
                tag: byte,
                offset: Some(offset),
                key: None,
            })?;
            break self.read_key_value(value_type, offset)?;
        };

        self.observe(&record);
        Ok(Some(record))
    }

    /// Читает трейлер после конца потока записей и проверяет CRC64.
    ///
    /// Для версий до 5 трейлера нет. Для остальных обрыв файла вместо
    /// опкода `EOF` допустим только с `allow_missing`.
    pub fn finish(
        &mut self,
        policy: TrailerPolicy,
    ) -> RdbResult<ChecksumStatus> {
        let version = self.read_header()?;
        let end = match self.end {
            Some(end) => end,
            None => {
                return Err(RdbError::corrupt(
                    "stream",
                    "trailer requested before end of records",
                    self.source.offset(),
                )
                .into())
            }
        };

        let status = match end {
            _ if !version.has_checksum() => ChecksumStatus::Absent,
            StreamEnd::EndOfInput if policy.allow_missing => {
                tracing::warn!(
                    offset = self.source.offset(),
                    "snapshot ends without EOF marker and checksum trailer"
                );
                ChecksumStatus::Absent
            }
            StreamEnd::EndOfInput => {
                return Err(RdbError::truncated(
                    "expecting opcode or end-of-stream marker",
                    self.source.offset(),
                )
                .into())
            }
            StreamEnd::Marker => {
                let computed = self.source.checksum();
                let stored = self.source.read_trailer()?;
                self.sync_offset();
                if policy.verify {
                    verify_trailer(computed, stored)?
                } else {
                    ChecksumStatus::Skipped
                }
            }
        };
        Ok(status)
    }

    /// Возвращает статистику разбора.
    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Возвращает версию снимка (если заголовок был прочитан).
    pub fn version(&self) -> Option<RdbVersion> {
        self.version
    }

    /// Номер текущей БД.
    pub fn current_db(&self) -> u64 {
        self.db
    }

    /// Кол-во байт, прочитанных из источника.
    pub fn offset(&self) -> u64 {
        self.source.offset()
    }

    /// Разбирает управляющий опкод. `None` — опкод не порождает записи.
    fn read_opcode(
        &mut self,
        opcode: Opcode,
        offset: u64,
    ) -> RdbResult<Option<Record>> {
        let record = match opcode {
            Opcode::Eof => {
                if !self.pending.is_empty() {
                    return Err(RdbError::corrupt(
                        "stream",
                        "key metadata is not followed by a key",
                        offset,
                    )
                    .into());
                }
                self.end = Some(StreamEnd::Marker);
                return Ok(None);
            }
            Opcode::SelectDb => {
                let index = read_plain_length(&mut self.source, "db number")?;
                tracing::debug!(db = index, offset, "select db");
                self.db = index;
                Record::SelectDb { index }
            }
            Opcode::ResizeDb => {
                let db_size = read_plain_length(&mut self.source, "resizedb db size")?;
                let expires_size = read_plain_length(&mut self.source, "resizedb expires size")?;
                tracing::debug!(db_size, expires_size, "resize hint");
                Record::ResizeHint {
                    db_size,
                    expires_size,
                }
            }
            Opcode::Aux => {
                let key = read_string(&mut self.source, &self.limits)?;
                let value = read_string(&mut self.source, &self.limits)?;
                tracing::debug!(
                    key = %display_key(&key),
                    value = %display_key(&value),
                    "aux field"
                );
                Record::Metadata { key, value }
            }
            Opcode::SlotInfo => {
                let slot_id = read_plain_length(&mut self.source, "slot id")?;
                let slot_size = read_plain_length(&mut self.source, "slot size")?;
                let expires_slot_size = read_plain_length(&mut self.source, "slot expires size")?;
                tracing::debug!(slot_id, slot_size, expires_slot_size, "slot info");
                Record::SlotInfo {
                    slot_id,
                    slot_size,
                    expires_slot_size,
                }
            }
            Opcode::Function2 => Record::Function {
                code: read_string(&mut self.source, &self.limits)?,
            },
            Opcode::ExpireTimeMs => {
                let ms = self.source.read_u64_le("reading expire time (ms)")? as i64;
                self.pending.expiry = Some(Expiry::millis(ms));
                return Ok(None);
            }
            Opcode::ExpireTime => {
                let secs = self.source.read_u32_le("reading expire time (s)")? as i32;
                self.pending.expiry = Some(Expiry::seconds(i64::from(secs)));
                return Ok(None);
            }
            Opcode::Idle => {
                self.pending.idle = Some(read_plain_length(&mut self.source, "idle time")?);
                return Ok(None);
            }
            Opcode::Freq => {
                self.pending.freq = Some(self.source.read_u8("reading lfu frequency")?);
                return Ok(None);
            }
            Opcode::FunctionPreGa | Opcode::ModuleAux => {
                return Err(RdbError::UnsupportedType {
                    tag: opcode as u8,
                    offset: Some(offset),
                    key: None,
                }
                .into())
            }
        };
        Ok(Some(record))
    }

    fn read_key_value(
        &mut self,
        value_type: ValueType,
        offset: u64,
    ) -> RdbResult<Record> {
        let key = read_string(&mut self.source, &self.limits)?;
        if !value_type.is_supported() {
            let err = RdbError::UnsupportedType {
                tag: value_type as u8,
                offset: Some(offset),
                key: Some(display_key(&key)),
            };
            return Err(StackError::from(err)
                .context(format!("decoding {} value", value_type.logical_name())));
        }
        let value = read_value(&mut self.source, value_type, &self.limits)
            .map_err(|e| e.map_rdb(|r| r.with_key(display_key(&key))))?;

        let pending = std::mem::take(&mut self.pending);
        tracing::trace!(
            db = self.db,
            key = %display_key(&key),
            kind = value.type_name(),
            offset,
            "decoded key"
        );
        Ok(Record::KeyValue(Entry {
            db: self.db,
            key,
            value_type,
            value,
            expiry: pending.expiry,
            idle: pending.idle,
            freq: pending.freq,
        }))
    }

    fn observe(
        &mut self,
        record: &Record,
    ) {
        self.stats.records += 1;
        match record {
            Record::KeyValue(entry) => {
                self.stats.keys += 1;
                if entry.expiry.is_some() {
                    self.stats.keys_with_expiry += 1;
                }
            }
            Record::Metadata { .. } => self.stats.metadata += 1,
            Record::SelectDb { .. } => self.stats.db_selects += 1,
            _ => {}
        }
        self.sync_offset();
    }

    fn sync_offset(&mut self) {
        self.stats.bytes_read = self.source.offset();
    }
}

/// Ключ для сообщений и логов: UTF-8 с заменой невалидных байт.
pub(crate) fn display_key(key: &Bytes) -> String {
    String::from_utf8_lossy(key).into_owned()
}

////////////////////////////////////////////////////////////////////////////////
// Готовые обработчики
////////////////////////////////////////////////////////////////////////////////

/// Handler для сбора всех записей в Vec.
#[derive(Debug, Default)]
pub struct CollectHandler {
    version: Option<RdbVersion>,
    records: Vec<Record>,
    checksum: Option<ChecksumStatus>,
}

/// Handler для подсчёта статистики по типам без хранения значений.
#[derive(Debug, Default)]
pub struct CountHandler {
    version: Option<RdbVersion>,
    total_keys: u64,
    by_type: HashMap<&'static str, u64>,
    by_db: HashMap<u64, u64>,
    expires: u64,
    key_bytes: u64,
    metadata: Vec<(Bytes, Bytes)>,
    checksum: Option<ChecksumStatus>,
}

/// Handler для фильтрации ключей по предикату.
///
/// Хранит в памяти только ключи, удовлетворяющие предикату.
pub struct FilterHandler<F>
where
    F: Fn(&Entry) -> bool,
{
    predicate: F,
    entries: Vec<Entry>,
}

/// Handler с callback ф-ей для каждой записи.
pub struct CallbackHandler<F>
where
    F: FnMut(Record) -> RdbResult<()>,
{
    callback: F,
}

impl CollectHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Возвращает собранные записи.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Забирает собранные записи.
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Только пары ключ/значение.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.records.iter().filter_map(Record::as_entry)
    }

    pub fn version(&self) -> Option<RdbVersion> {
        self.version
    }

    /// Итог проверки трейлера (после события `End`).
    pub fn checksum(&self) -> Option<ChecksumStatus> {
        self.checksum
    }
}

impl RecordHandler for CollectHandler {
    fn handle_event(
        &mut self,
        event: LoadEvent,
    ) -> RdbResult<()> {
        match event {
            LoadEvent::Header { version } => self.version = Some(version),
            LoadEvent::Record(record) => self.records.push(record),
            LoadEvent::End { checksum } => self.checksum = Some(checksum),
        }
        Ok(())
    }
}

impl CountHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Общее кол-во ключей.
    pub fn total_keys(&self) -> u64 {
        self.total_keys
    }

    /// Кол-во ключей логического типа (`"string"`, `"list"`, ...).
    pub fn count_of(
        &self,
        type_name: &str,
    ) -> u64 {
        self.by_type.get(type_name).copied().unwrap_or(0)
    }

    /// Кол-во ключей по БД, отсортированное по номеру.
    pub fn keys_per_db(&self) -> Vec<(u64, u64)> {
        let mut out: Vec<_> = self.by_db.iter().map(|(db, n)| (*db, *n)).collect();
        out.sort_unstable();
        out
    }

    /// Кол-во ключей со временем истечения.
    pub fn expires(&self) -> u64 {
        self.expires
    }

    /// Средняя длина ключа.
    pub fn avg_key_length(&self) -> f64 {
        if self.total_keys == 0 {
            0.0
        } else {
            self.key_bytes as f64 / self.total_keys as f64
        }
    }

    /// Метаданные снимка в порядке файла.
    pub fn metadata(&self) -> &[(Bytes, Bytes)] {
        &self.metadata
    }

    pub fn version(&self) -> Option<RdbVersion> {
        self.version
    }

    pub fn checksum(&self) -> Option<ChecksumStatus> {
        self.checksum
    }
}

impl RecordHandler for CountHandler {
    fn handle_event(
        &mut self,
        event: LoadEvent,
    ) -> RdbResult<()> {
        match event {
            LoadEvent::Header { version } => self.version = Some(version),
            LoadEvent::Record(Record::KeyValue(entry)) => {
                self.total_keys += 1;
                self.key_bytes += entry.key.len() as u64;
                *self.by_type.entry(entry.value.type_name()).or_default() += 1;
                *self.by_db.entry(entry.db).or_default() += 1;
                if entry.expiry.is_some() {
                    self.expires += 1;
                }
            }
            LoadEvent::Record(Record::Metadata { key, value }) => self.metadata.push((key, value)),
            LoadEvent::Record(_) => {}
            LoadEvent::End { checksum } => self.checksum = Some(checksum),
        }
        Ok(())
    }
}

impl<F> FilterHandler<F>
where
    F: Fn(&Entry) -> bool,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            entries: Vec::new(),
        }
    }

    /// Возвращает отобранные ключи.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

impl<F> RecordHandler for FilterHandler<F>
where
    F: Fn(&Entry) -> bool,
{
    fn handle_event(
        &mut self,
        event: LoadEvent,
    ) -> RdbResult<()> {
        if let LoadEvent::Record(Record::KeyValue(entry)) = event {
            if (self.predicate)(&entry) {
                self.entries.push(entry);
            }
        }
        Ok(())
    }
}

impl<F> CallbackHandler<F>
where
    F: FnMut(Record) -> RdbResult<()>,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> RecordHandler for CallbackHandler<F>
where
    F: FnMut(Record) -> RdbResult<()>,
{
    fn handle_event(
        &mut self,
        event: LoadEvent,
    ) -> RdbResult<()> {
        match event {
            LoadEvent::Record(record) => (self.callback)(record),
            _ => Ok(()),
        }
    }
}
