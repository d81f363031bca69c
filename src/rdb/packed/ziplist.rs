//! Ziplist: `zlbytes:u32le zltail:u32le zllen:u16le <entries> 0xFF`.
//!
//! Каждая запись: длина предыдущей записи (1 байт, либо `0xFE` + 4 байта),
//! байт кодировки и данные. Кодировка строк: `00pppppp`, `01pppppp qqqqqqqq`
//! (14 бит BE), `10______` + 4 байта BE. Целые: `0xC0` i16, `0xD0` i32,
//! `0xE0` i64, `0xF0` i24, `0xFE` i8, `0xF1..=0xFD` — значение 0..=12 прямо в
//! байте кодировки.

use bytes::Bytes;

use super::{int_to_bytes, PackedReader, PackedResult};

const ZIPLIST_HEADER_LEN: usize = 10;
const ZIP_END: u8 = 0xFF;
const ZIP_BIG_PREVLEN: u8 = 0xFE;
/// Счётчик записей «не поместился в u16», считаем явно.
const ZIP_LEN_UNKNOWN: u16 = u16::MAX;

const ZIP_INT_16B: u8 = 0xC0;
const ZIP_INT_32B: u8 = 0xD0;
const ZIP_INT_64B: u8 = 0xE0;
const ZIP_INT_24B: u8 = 0xF0;
const ZIP_INT_8B: u8 = 0xFE;
const ZIP_INT_IMM_MIN: u8 = 0xF1;
const ZIP_INT_IMM_MAX: u8 = 0xFD;

const STRUCTURE: &str = "ziplist";

/// Разбирает ziplist в плоский список элементов.
pub fn parse_ziplist(blob: &Bytes) -> PackedResult<Vec<Bytes>> {
    let mut r = PackedReader::new(blob, STRUCTURE);
    if blob.len() < ZIPLIST_HEADER_LEN + 1 {
        return Err(r.corrupt(format!("blob of {} bytes is shorter than header", blob.len())));
    }

    let zlbytes = r.u32_le()?;
    if zlbytes as usize != blob.len() {
        return Err(r.corrupt(format!(
            "header declares {zlbytes} bytes, blob has {}",
            blob.len()
        )));
    }
    let zltail = r.u32_le()?;
    if zltail as usize >= blob.len() {
        return Err(r.corrupt(format!("tail offset {zltail} points past blob")));
    }
    let zllen = r.u16_le()?;

    let mut items = Vec::with_capacity(usize::from(zllen.min(1024)));
    loop {
        if r.peek_u8()? == ZIP_END {
            r.skip(1)?;
            break;
        }
        skip_prevlen(&mut r)?;
        items.push(read_entry(&mut r)?);
    }
    r.expect_end()?;

    if zllen != ZIP_LEN_UNKNOWN && usize::from(zllen) != items.len() {
        return Err(r.corrupt(format!(
            "header declares {zllen} entries, found {}",
            items.len()
        )));
    }
    Ok(items)
}

fn skip_prevlen(r: &mut PackedReader<'_>) -> PackedResult<()> {
    if r.u8()? == ZIP_BIG_PREVLEN {
        r.skip(4)?;
    }
    Ok(())
}

fn read_entry(r: &mut PackedReader<'_>) -> PackedResult<Bytes> {
    let enc = r.u8()?;
    match enc >> 6 {
        0b00 => r.take(usize::from(enc & 0x3F)),
        0b01 => {
            let low = r.u8()?;
            r.take((usize::from(enc & 0x3F) << 8) | usize::from(low))
        }
        0b10 => {
            let len = r.u32_be()?;
            r.take(len as usize)
        }
        _ => {
            let value = match enc {
                ZIP_INT_16B => i64::from(r.i16_le()?),
                ZIP_INT_32B => i64::from(r.i32_le()?),
                ZIP_INT_64B => r.i64_le()?,
                ZIP_INT_24B => i64::from(r.i24_le()?),
                ZIP_INT_8B => i64::from(r.u8()? as i8),
                ZIP_INT_IMM_MIN..=ZIP_INT_IMM_MAX => i64::from(enc & 0x0F) - 1,
                other => return Err(r.corrupt(format!("unknown entry encoding 0x{other:02X}"))),
            };
            Ok(int_to_bytes(value))
        }
    }
}

/// Сборка ziplist для тестов модуля.
#[cfg(test)]
pub(crate) mod build {
    /// Собирает ziplist из строковых записей (до 63 байт) и целых.
    pub(crate) fn ziplist(entries: &[Result<&str, i64>]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut prev = 0usize;
        let mut tail = 10usize;
        for entry in entries {
            let start = body.len();
            tail = 10 + start;
            body.push(prev as u8);
            match entry {
                Ok(s) => {
                    body.push(s.len() as u8);
                    body.extend_from_slice(s.as_bytes());
                }
                Err(n) => {
                    body.push(0xE0);
                    body.extend_from_slice(&n.to_le_bytes());
                }
            }
            prev = body.len() - start;
        }
        let total = 10 + body.len() + 1;
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(tail as u32).to_le_bytes());
        out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&body);
        out.push(0xFF);
        out
    }
}
