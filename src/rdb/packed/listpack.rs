//! Listpack: `total:u32le count:u16le <entries> 0xFF`.
//!
//! Запись: байт кодировки, данные и backlen — длина записи (кодировка +
//! данные) в 1..=5 байтах, нужная для обхода с конца. При прямом обходе
//! backlen пропускается.

use bytes::Bytes;

use super::{int_to_bytes, PackedReader, PackedResult};

const LP_HEADER_LEN: usize = 6;
const LP_EOF: u8 = 0xFF;
const LP_COUNT_UNKNOWN: u16 = u16::MAX;

const LP_ENCODING_16BIT_INT: u8 = 0xF1;
const LP_ENCODING_24BIT_INT: u8 = 0xF2;
const LP_ENCODING_32BIT_INT: u8 = 0xF3;
const LP_ENCODING_64BIT_INT: u8 = 0xF4;
const LP_ENCODING_32BIT_STR: u8 = 0xF0;

const STRUCTURE: &str = "listpack";

/// Разбирает listpack в плоский список элементов.
pub fn parse_listpack(blob: &Bytes) -> PackedResult<Vec<Bytes>> {
    let mut r = PackedReader::new(blob, STRUCTURE);
    if blob.len() < LP_HEADER_LEN + 1 {
        return Err(r.corrupt(format!("blob of {} bytes is shorter than header", blob.len())));
    }

    let total = r.u32_le()?;
    if total as usize != blob.len() {
        return Err(r.corrupt(format!(
            "header declares {total} bytes, blob has {}",
            blob.len()
        )));
    }
    let count = r.u16_le()?;

    let mut items = Vec::with_capacity(usize::from(count.min(1024)));
    loop {
        if r.peek_u8()? == LP_EOF {
            r.skip(1)?;
            break;
        }
        let start = r.pos();
        let item = read_entry(&mut r)?;
        let entry_len = r.pos() - start;
        r.skip(backlen_size(entry_len))?;
        items.push(item);
    }
    r.expect_end()?;

    if count != LP_COUNT_UNKNOWN && usize::from(count) != items.len() {
        return Err(r.corrupt(format!(
            "header declares {count} entries, found {}",
            items.len()
        )));
    }
    Ok(items)
}

fn read_entry(r: &mut PackedReader<'_>) -> PackedResult<Bytes> {
    let enc = r.u8()?;
    if enc & 0x80 == 0 {
        // 0xxxxxxx: 7-битное беззнаковое
        return Ok(int_to_bytes(i64::from(enc & 0x7F)));
    }
    if enc & 0xC0 == 0x80 {
        // 10xxxxxx: строка до 63 байт
        return r.take(usize::from(enc & 0x3F));
    }
    if enc & 0xE0 == 0xC0 {
        // 110xxxxx: 13-битное знаковое
        let low = r.u8()?;
        let raw = (i64::from(enc & 0x1F) << 8) | i64::from(low);
        let value = if raw >= 1 << 12 { raw - (1 << 13) } else { raw };
        return Ok(int_to_bytes(value));
    }
    if enc & 0xF0 == 0xE0 {
        // 1110xxxx: строка до 4095 байт
        let low = r.u8()?;
        return r.take((usize::from(enc & 0x0F) << 8) | usize::from(low));
    }
    let value = match enc {
        LP_ENCODING_32BIT_STR => {
            let len = r.u32_le()?;
            return r.take(len as usize);
        }
        LP_ENCODING_16BIT_INT => i64::from(r.i16_le()?),
        LP_ENCODING_24BIT_INT => i64::from(r.i24_le()?),
        LP_ENCODING_32BIT_INT => i64::from(r.i32_le()?),
        LP_ENCODING_64BIT_INT => r.i64_le()?,
        other => return Err(r.corrupt(format!("unknown entry encoding 0x{other:02X}"))),
    };
    Ok(int_to_bytes(value))
}

/// Сколько байт занимает backlen для записи длины `len`.
fn backlen_size(len: usize) -> usize {
    match len {
        0..=127 => 1,
        128..=16382 => 2,
        16383..=2_097_150 => 3,
        2_097_151..=268_435_454 => 4,
        _ => 5,
    }
}
