//! Записи, которые загрузчик отдаёт обработчику.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use ordered_float::OrderedFloat;

use super::tags::ValueType;

/// Декодированное значение ключа.
///
/// Все компактные кодировки разворачиваются в логическую форму: список,
/// множество, отсортированное множество или хэш. Целые из компактных
/// кодировок отдаются десятичной записью.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(Bytes),
    List(Vec<Bytes>),
    /// Элементы в порядке файла
    Set(Vec<Bytes>),
    /// Пары (member, score) в порядке файла
    SortedSet(Vec<(Bytes, OrderedFloat<f64>)>),
    Hash(HashMap<Bytes, Bytes>),
}

impl Value {
    /// Логическое имя типа (как в команде `TYPE`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Hash(_) => "hash",
        }
    }

    /// Кол-во элементов (для строки — длина в байтах).
    pub fn len(&self) -> usize {
        match self {
            Value::Str(s) => s.len(),
            Value::List(items) | Value::Set(items) => items.len(),
            Value::SortedSet(items) => items.len(),
            Value::Hash(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Единица абсолютного времени истечения.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryUnit {
    Seconds,
    Milliseconds,
}

/// Абсолютное время истечения ключа (Unix epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub timestamp: i64,
    pub unit: ExpiryUnit,
}

impl Expiry {
    pub fn seconds(timestamp: i64) -> Self {
        Self {
            timestamp,
            unit: ExpiryUnit::Seconds,
        }
    }

    pub fn millis(timestamp: i64) -> Self {
        Self {
            timestamp,
            unit: ExpiryUnit::Milliseconds,
        }
    }

    /// Время истечения в миллисекундах.
    pub fn as_millis(&self) -> i64 {
        match self.unit {
            ExpiryUnit::Seconds => self.timestamp.saturating_mul(1000),
            ExpiryUnit::Milliseconds => self.timestamp,
        }
    }

    /// Время истечения как дата; `None`, если выходит за диапазон chrono.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.as_millis()).single()
    }

    /// Истёк ли ключ к моменту `now`.
    pub fn is_expired_at(
        &self,
        now: DateTime<Utc>,
    ) -> bool {
        self.as_millis() <= now.timestamp_millis()
    }
}

/// Пара ключ/значение с метаданными.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Номер БД из последнего `SELECTDB` (0 до первого)
    pub db: u64,
    pub key: Bytes,
    /// Тег значения в файле
    pub value_type: ValueType,
    pub value: Value,
    pub expiry: Option<Expiry>,
    /// LRU idle time в секундах
    pub idle: Option<u64>,
    /// LFU частота
    pub freq: Option<u8>,
}

/// Логическая запись потока.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Метаданные (`AUX`): версия сервера, время создания и т.п.
    Metadata { key: Bytes, value: Bytes },
    /// Смена текущей БД
    SelectDb { index: u64 },
    /// Подсказка размеров БД (`RESIZEDB`)
    ResizeHint { db_size: u64, expires_size: u64 },
    /// Информация о слоте кластера
    SlotInfo {
        slot_id: u64,
        slot_size: u64,
        expires_slot_size: u64,
    },
    /// Код библиотеки функций (`FUNCTION2`)
    Function { code: Bytes },
    /// Ключ со значением
    KeyValue(Entry),
}

impl Record {
    /// Короткое имя вида записи для логов и статистики.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Record::Metadata { .. } => "metadata",
            Record::SelectDb { .. } => "select_db",
            Record::ResizeHint { .. } => "resize_hint",
            Record::SlotInfo { .. } => "slot_info",
            Record::Function { .. } => "function",
            Record::KeyValue(_) => "key_value",
        }
    }

    /// Запись ключа, если это она.
    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Record::KeyValue(entry) => Some(entry),
            _ => None,
        }
    }
}
