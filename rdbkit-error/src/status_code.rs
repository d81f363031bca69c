use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок загрузки.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 5xxx: Формат снимка (заголовок, содержимое, контрольная сумма)
/// - 6xxx: Ввод-вывод
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 5xxx: Формат снимка ===
    BadMagic = 5000,
    UnsupportedVersion = 5001,
    CorruptedData = 5002,
    UnsupportedType = 5003,
    ChecksumMismatch = 5004,

    // === 6xxx: Ввод-вывод ===
    Io = 6000,
    NotFound = 6001,
    PermissionDenied = 6002,
    Truncated = 6007,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Имеет ли смысл повторить загрузку целиком.
    ///
    /// Загрузчик сам никогда не повторяет чтение; решение остаётся за
    /// вызывающим кодом.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Truncated)
    }

    /// Ошибка формата снимка (диапазон 5xxx).
    pub fn is_format_error(&self) -> bool {
        (5000..=5999).contains(&self.code())
    }

    /// Ошибка ввода-вывода (диапазон 6xxx).
    pub fn is_io_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::InvalidArgs | Self::NotFound => LogLevel::Info,
            Self::BadMagic | Self::UnsupportedVersion | Self::UnsupportedType => LogLevel::Warn,
            Self::Internal | Self::CorruptedData | Self::ChecksumMismatch => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
