use std::fmt;

use rdbkit_error::{RdbError, RdbResult};
use serde::Serialize;

/// «Магическое» начало файла: ASCII-буквы «REDIS».
pub const RDB_MAGIC: &[u8; 5] = b"REDIS";

/// Кол-во ASCII-цифр версии после магии.
pub const RDB_VERSION_DIGITS: usize = 4;

/// Первая версия формата, в которой после `EOF` записывается CRC64.
pub const CHECKSUM_MIN_VERSION: u32 = 5;

/// Версия формата снимка из заголовка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RdbVersion(u32);

impl RdbVersion {
    /// Минимальная поддерживаемая версия.
    pub const MIN: RdbVersion = RdbVersion(1);
    /// Максимальная поддерживаемая версия.
    pub const MAX: RdbVersion = RdbVersion(12);

    /// Создаёт версию из числа, проверяя диапазон.
    pub fn new(version: u32) -> RdbResult<Self> {
        if (Self::MIN.0..=Self::MAX.0).contains(&version) {
            Ok(Self(version))
        } else {
            Err(unsupported(version.to_string()).into())
        }
    }

    /// Разбирает четыре ASCII-цифры версии из заголовка.
    pub fn parse(digits: &[u8; 4]) -> RdbResult<Self> {
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(unsupported(String::from_utf8_lossy(digits).into_owned()).into());
        }
        let version = digits
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));
        Self::new(version)
    }

    /// Проверяет уже прочитанное начало магии.
    ///
    /// Вызывается после каждого байта, поэтому короткий файл с чужим началом
    /// даёт `BadMagic`, а не `Truncated`.
    pub fn check_magic(prefix: &[u8]) -> RdbResult<()> {
        if RDB_MAGIC.starts_with(prefix) {
            return Ok(());
        }
        let mut got = [0u8; 5];
        let len = prefix.len().min(got.len());
        got[..len].copy_from_slice(&prefix[..len]);
        Err(RdbError::BadMagic { got }.into())
    }

    /// Числовое значение версии.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Записывается ли в файл этой версии CRC64-трейлер.
    pub fn has_checksum(self) -> bool {
        self.0 >= CHECKSUM_MIN_VERSION
    }
}

impl fmt::Display for RdbVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

fn unsupported(found: String) -> RdbError {
    RdbError::UnsupportedVersion {
        found,
        min: RdbVersion::MIN.0,
        max: RdbVersion::MAX.0,
    }
}
