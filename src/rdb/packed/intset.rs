//! Intset: `encoding:u32le length:u32le <length × encoding байт>`.
//!
//! Ширина элемента — 2, 4 или 8 байт, все элементы знаковые little-endian
//! и идут строго по возрастанию.

use bytes::Bytes;

use super::{int_to_bytes, PackedReader, PackedResult};

const STRUCTURE: &str = "intset";

/// Разбирает intset в список десятичных записей элементов.
pub fn parse_intset(blob: &Bytes) -> PackedResult<Vec<Bytes>> {
    let mut r = PackedReader::new(blob, STRUCTURE);
    let width = r.u32_le()?;
    if !matches!(width, 2 | 4 | 8) {
        return Err(r.corrupt(format!("invalid element width {width}")));
    }
    let length = r.u32_le()?;
    let expected = u64::from(length) * u64::from(width);
    if expected != r.remaining() as u64 {
        return Err(r.corrupt(format!(
            "{length} elements of {width} bytes do not fill {} remaining bytes",
            r.remaining()
        )));
    }

    let mut items = Vec::with_capacity(length as usize);
    let mut prev: Option<i64> = None;
    for _ in 0..length {
        let value = match width {
            2 => i64::from(r.i16_le()?),
            4 => i64::from(r.i32_le()?),
            _ => r.i64_le()?,
        };
        if let Some(prev) = prev.filter(|p| value <= *p) {
            return Err(r.corrupt(format!(
                "element {value} does not follow {prev} in ascending order"
            )));
        }
        prev = Some(value);
        items.push(int_to_bytes(value));
    }
    Ok(items)
}
