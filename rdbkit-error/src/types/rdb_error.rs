use std::{any::Any, io};

use crate::{ErrorExt, StatusCode};

/// Вид ошибки загрузки снимка.
///
/// Семь видов покрывают всю поверхность ошибок загрузчика: заголовок
/// (`BadMagic`, `UnsupportedVersion`), ввод-вывод (`Truncated`, `IoError`),
/// содержимое (`CorruptPayload`, `UnsupportedType`) и трейлер
/// (`ChecksumMismatch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdbErrorKind {
    BadMagic,
    UnsupportedVersion,
    Truncated,
    CorruptPayload,
    UnsupportedType,
    ChecksumMismatch,
    IoError,
}

/// Основная ошибка загрузки RDB с контекстом для диагностики.
#[derive(Debug, Clone)]
pub enum RdbError {
    /// Первые пять байт не равны `REDIS`
    BadMagic { got: [u8; 5] },

    /// Версия не число или вне поддерживаемого диапазона
    UnsupportedVersion { found: String, min: u32, max: u32 },

    /// Поток закончился внутри записи
    Truncated {
        context: String,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// Структурно некорректное значение (длины, сжатие, компактные кодировки)
    CorruptPayload {
        structure: String,
        reason: String,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// Опкод/тег значения, который загрузчик не декодирует
    UnsupportedType {
        tag: u8,
        offset: Option<u64>,
        key: Option<String>,
    },

    /// CRC64 в трейлере не совпадает с вычисленной
    ChecksumMismatch { computed: u64, stored: u64 },

    /// Прочие ошибки чтения источника
    Io { kind: io::ErrorKind, reason: String },
}

impl RdbError {
    /// Короткий конструктор для `Truncated`.
    pub fn truncated(
        context: impl Into<String>,
        offset: u64,
    ) -> Self {
        Self::Truncated {
            context: context.into(),
            offset: Some(offset),
            key: None,
        }
    }

    /// Короткий конструктор для `CorruptPayload`.
    pub fn corrupt(
        structure: impl Into<String>,
        reason: impl Into<String>,
        offset: u64,
    ) -> Self {
        Self::CorruptPayload {
            structure: structure.into(),
            reason: reason.into(),
            offset: Some(offset),
            key: None,
        }
    }

    /// Вид ошибки.
    pub fn kind(&self) -> RdbErrorKind {
        match self {
            Self::BadMagic { .. } => RdbErrorKind::BadMagic,
            Self::UnsupportedVersion { .. } => RdbErrorKind::UnsupportedVersion,
            Self::Truncated { .. } => RdbErrorKind::Truncated,
            Self::CorruptPayload { .. } => RdbErrorKind::CorruptPayload,
            Self::UnsupportedType { .. } => RdbErrorKind::UnsupportedType,
            Self::ChecksumMismatch { .. } => RdbErrorKind::ChecksumMismatch,
            Self::Io { .. } => RdbErrorKind::IoError,
        }
    }

    /// Добавляет контекст offset к ошибке (если он ещё не задан).
    pub fn with_offset(
        mut self,
        offset: u64,
    ) -> Self {
        match &mut self {
            Self::Truncated { offset: o, .. }
            | Self::CorruptPayload { offset: o, .. }
            | Self::UnsupportedType { offset: o, .. } => {
                if o.is_none() {
                    *o = Some(offset);
                }
            }
            _ => {}
        }
        self
    }

    /// Добавляет контекст ключа к ошибке.
    pub fn with_key(
        mut self,
        key: impl Into<String>,
    ) -> Self {
        match &mut self {
            Self::Truncated { key: k, .. }
            | Self::CorruptPayload { key: k, .. }
            | Self::UnsupportedType { key: k, .. } => {
                *k = Some(key.into());
            }
            _ => {}
        }
        self
    }

    /// Возвращает подсказку оператору.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            Self::BadMagic { .. } => Some("The file is not an RDB snapshot"),
            Self::UnsupportedVersion { .. } => {
                Some("The snapshot was written by a newer server than this loader supports")
            }
            Self::Truncated { .. } => Some("File may be truncated. Check the copy is complete"),
            Self::CorruptPayload { .. } | Self::ChecksumMismatch { .. } => {
                Some("File is corrupted. Try a backup copy of the snapshot")
            }
            Self::UnsupportedType { .. } => {
                Some("The snapshot contains a data type this loader does not decode")
            }
            Self::Io { .. } => None,
        }
    }
}

impl std::fmt::Display for RdbError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::BadMagic { got } => {
                write!(
                    f,
                    "Bad magic: expected \"REDIS\", got {:?}",
                    String::from_utf8_lossy(got)
                )
            }
            Self::UnsupportedVersion { found, min, max } => {
                write!(f, "Unsupported RDB version {found:?} (supported: {min}..={max})")
            }
            Self::Truncated {
                context,
                offset,
                key,
            } => {
                write!(f, "Truncated input: {context}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::CorruptPayload {
                structure,
                reason,
                offset,
                key,
            } => {
                write!(f, "Corrupt {structure}: {reason}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::UnsupportedType { tag, offset, key } => {
                write!(f, "Unsupported type or opcode 0x{tag:02X}")?;
                write_context(f, *offset, key.as_deref())
            }
            Self::ChecksumMismatch { computed, stored } => {
                write!(
                    f,
                    "Checksum mismatch: computed 0x{computed:016X}, stored 0x{stored:016X}",
                )
            }
            Self::Io { kind, reason } => write!(f, "I/O error ({kind:?}): {reason}"),
        }
    }
}

/// Вспомогательная функция для форматирования контекста (offset, key).
fn write_context(
    f: &mut std::fmt::Formatter<'_>,
    offset: Option<u64>,
    key: Option<&str>,
) -> std::fmt::Result {
    let mut parts = Vec::new();
    if let Some(o) = offset {
        parts.push(format!("offset: 0x{o:X}"));
    }
    if let Some(k) = key {
        parts.push(format!("key: {k}"));
    }
    if !parts.is_empty() {
        write!(f, " [{}]", parts.join(", "))?;
    }
    Ok(())
}

impl std::error::Error for RdbError {}

impl ErrorExt for RdbError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadMagic { .. } => StatusCode::BadMagic,
            Self::UnsupportedVersion { .. } => StatusCode::UnsupportedVersion,
            Self::Truncated { .. } => StatusCode::Truncated,
            Self::CorruptPayload { .. } => StatusCode::CorruptedData,
            Self::UnsupportedType { .. } => StatusCode::UnsupportedType,
            Self::ChecksumMismatch { .. } => StatusCode::ChecksumMismatch,
            Self::Io { kind, .. } => match kind {
                io::ErrorKind::NotFound => StatusCode::NotFound,
                io::ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
                _ => StatusCode::Io,
            },
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::BadMagic { .. } => "Not an RDB file".to_string(),
            Self::UnsupportedVersion { found, .. } => format!("Unsupported RDB version {found}"),
            Self::Truncated { .. } => "Incomplete RDB file".to_string(),
            Self::CorruptPayload { structure, .. } => format!("Corrupt {structure} in RDB file"),
            Self::UnsupportedType { tag, .. } => format!("Unsupported RDB type 0x{tag:02X}"),
            Self::ChecksumMismatch { .. } => "RDB trailer verification failed".to_string(),
            Self::Io { reason, .. } => format!("I/O error: {reason}"),
        }
    }

    fn log_message(&self) -> String {
        let mut msg = format!("{self:?}");
        if let Some(hint) = self.recovery_hint() {
            msg.push_str(&format!(" | Hint: {hint}"));
        }
        msg
    }
}

impl From<io::Error> for RdbError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => RdbError::Truncated {
                context: e.to_string(),
                offset: None,
                key: None,
            },
            kind => RdbError::Io {
                kind,
                reason: e.to_string(),
            },
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
