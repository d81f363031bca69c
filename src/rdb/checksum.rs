//! Инкрементальная CRC64 снимка и итог проверки трейлера.
//!
//! Сумма покрывает все байты файла от магии до опкода `EOF` включительно.
//! Сам трейлер (8 байт little-endian) в сумму не входит. Нулевой трейлер
//! означает, что сервер писал снимок с отключённой контрольной суммой.

use crc::{Crc, Digest, CRC_64_REDIS};
use rdbkit_error::{RdbError, RdbResult};
use serde::Serialize;

/// CRC-64/Jones, отражённая, как в сервере.
pub static CRC64_REDIS: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// Значение трейлера, означающее «проверка отключена».
pub const CHECKSUM_DISABLED: u64 = 0;

/// Накопитель CRC64 по прочитанным байтам.
#[derive(Clone)]
pub struct Crc64 {
    digest: Digest<'static, u64>,
}

/// Итог проверки трейлера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ChecksumStatus {
    /// Трейлер совпал с вычисленной суммой
    Verified(u64),
    /// В трейлере записан ноль
    Disabled,
    /// Трейлера нет: версия до 5 или разрешённый обрыв после последней записи
    Absent,
    /// Трейлер прочитан, но проверка выключена опциями
    Skipped,
}

impl Crc64 {
    pub fn new() -> Self {
        Self {
            digest: CRC64_REDIS.digest(),
        }
    }

    pub fn update(
        &mut self,
        bytes: &[u8],
    ) {
        self.digest.update(bytes);
    }

    /// Текущее значение суммы; накопление можно продолжать.
    pub fn current(&self) -> u64 {
        self.digest.clone().finalize()
    }
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc64 {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Crc64(0x{:016X})", self.current())
    }
}

impl ChecksumStatus {
    /// Успешна ли проверка в строгом смысле.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }
}

/// Сравнивает трейлер с вычисленной суммой.
pub fn verify_trailer(
    computed: u64,
    stored: u64,
) -> RdbResult<ChecksumStatus> {
    if stored == CHECKSUM_DISABLED {
        return Ok(ChecksumStatus::Disabled);
    }
    if computed != stored {
        return Err(RdbError::ChecksumMismatch { computed, stored }.into());
    }
    Ok(ChecksumStatus::Verified(stored))
}
