//! Разбор компактных кодировок: ziplist, listpack, intset, zipmap.
//!
//! Каждая кодировка приходит как один строковый блоб. Разбор идёт по срезу в
//! памяти, выход за границы блоба — это `CorruptPayload`, а не `Truncated`:
//! сам блоб уже прочитан целиком.

pub mod intset;
pub mod listpack;
pub mod ziplist;
pub mod zipmap;

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use rdbkit_error::RdbError;

pub use intset::parse_intset;
pub use listpack::parse_listpack;
pub use ziplist::parse_ziplist;
pub use zipmap::parse_zipmap;

/// Результат разбора компактного блоба.
pub type PackedResult<T> = Result<T, RdbError>;

/// Курсор по блобу с проверкой границ.
pub(crate) struct PackedReader<'a> {
    buf: &'a Bytes,
    pos: usize,
    structure: &'static str,
}

impl<'a> PackedReader<'a> {
    pub(crate) fn new(
        buf: &'a Bytes,
        structure: &'static str,
    ) -> Self {
        Self {
            buf,
            pos: 0,
            structure,
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Ошибка разбора с позицией внутри блоба.
    pub(crate) fn corrupt(
        &self,
        reason: impl std::fmt::Display,
    ) -> RdbError {
        RdbError::CorruptPayload {
            structure: self.structure.to_string(),
            reason: format!("{reason} (at blob byte {})", self.pos),
            offset: None,
            key: None,
        }
    }

    /// Срез следующих `len` байт без копирования.
    pub(crate) fn take(
        &mut self,
        len: usize,
    ) -> PackedResult<Bytes> {
        if len > self.remaining() {
            return Err(self.corrupt(format!(
                "entry of {len} bytes overruns blob ({} left)",
                self.remaining()
            )));
        }
        let out = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(out)
    }

    pub(crate) fn skip(
        &mut self,
        len: usize,
    ) -> PackedResult<()> {
        self.take(len).map(|_| ())
    }

    pub(crate) fn peek_u8(&self) -> PackedResult<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.corrupt("unexpected end of blob"))
    }

    pub(crate) fn u8(&mut self) -> PackedResult<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Читает `N` байт little-endian в массив.
    pub(crate) fn array<const N: usize>(&mut self) -> PackedResult<[u8; N]> {
        let slice = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&slice);
        Ok(out)
    }

    pub(crate) fn u16_le(&mut self) -> PackedResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32_le(&mut self) -> PackedResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32_be(&mut self) -> PackedResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn i16_le(&mut self) -> PackedResult<i16> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    /// 24-битное знаковое целое little-endian.
    pub(crate) fn i24_le(&mut self) -> PackedResult<i32> {
        let [a, b, c] = self.array::<3>()?;
        Ok(i32::from_le_bytes([0, a, b, c]) >> 8)
    }

    pub(crate) fn i32_le(&mut self) -> PackedResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    pub(crate) fn i64_le(&mut self) -> PackedResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Проверяет, что после разбора в блобе ничего не осталось.
    pub(crate) fn expect_end(&self) -> PackedResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.corrupt(format!("{} trailing bytes after end marker", self.remaining())))
        }
    }
}

/// Целое из компактной кодировки отдаётся как его десятичная запись.
pub(crate) fn int_to_bytes(value: i64) -> Bytes {
    Bytes::from(value.to_string())
}

/// Разбивает плоский список элементов на пары поле/значение.
pub fn into_pairs(
    items: Vec<Bytes>,
    structure: &'static str,
) -> PackedResult<Vec<(Bytes, Bytes)>> {
    if items.len() % 2 != 0 {
        return Err(RdbError::CorruptPayload {
            structure: structure.to_string(),
            reason: format!("odd number of entries ({}) for a pair encoding", items.len()),
            offset: None,
            key: None,
        });
    }
    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
        pairs.push((field, value));
    }
    Ok(pairs)
}

/// Ошибка «элемент повторяется» для множеств, sorted set и хэшей.
pub(crate) fn duplicate(
    structure: &'static str,
    what: &str,
    member: &[u8],
) -> RdbError {
    RdbError::CorruptPayload {
        structure: structure.to_string(),
        reason: format!("duplicate {what} {:?}", String::from_utf8_lossy(member)),
        offset: None,
        key: None,
    }
}

/// Проверяет, что элементы множества не повторяются.
pub fn unique_members(
    items: Vec<Bytes>,
    structure: &'static str,
) -> PackedResult<Vec<Bytes>> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in &items {
        if !seen.insert(item) {
            return Err(duplicate(structure, "set member", item));
        }
    }
    Ok(items)
}

/// Собирает пары поле/значение в хэш. Повтор поля означает повреждение.
pub fn into_hash(
    pairs: Vec<(Bytes, Bytes)>,
    structure: &'static str,
) -> PackedResult<HashMap<Bytes, Bytes>> {
    let mut map = HashMap::with_capacity(pairs.len());
    for (field, value) in pairs {
        if map.contains_key(&field) {
            return Err(duplicate(structure, "hash field", &field));
        }
        map.insert(field, value);
    }
    Ok(map)
}
