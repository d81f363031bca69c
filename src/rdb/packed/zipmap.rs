//! Zipmap (устаревшая кодировка хэшей, RDB < 4).
//!
//! `zmlen:u8 (<len> key <len> <free:u8> value <free байт>)* 0xFF`. Длина —
//! один байт, либо `0xFE` и 4 байта little-endian.

use bytes::Bytes;

use super::{PackedReader, PackedResult};

const ZIPMAP_BIGLEN: u8 = 0xFE;
const ZIPMAP_END: u8 = 0xFF;

const STRUCTURE: &str = "zipmap";

/// Разбирает zipmap в пары поле/значение.
pub fn parse_zipmap(blob: &Bytes) -> PackedResult<Vec<(Bytes, Bytes)>> {
    let mut r = PackedReader::new(blob, STRUCTURE);
    let zmlen = r.u8()?;

    let mut pairs = Vec::with_capacity(usize::from(zmlen.min(ZIPMAP_BIGLEN)));
    loop {
        if r.peek_u8()? == ZIPMAP_END {
            r.skip(1)?;
            break;
        }
        let key_len = read_len(&mut r)?;
        let key = r.take(key_len)?;
        let value_len = read_len(&mut r)?;
        let free = r.u8()?;
        let value = r.take(value_len)?;
        r.skip(usize::from(free))?;
        pairs.push((key, value));
    }
    r.expect_end()?;

    if zmlen < ZIPMAP_BIGLEN && usize::from(zmlen) != pairs.len() {
        return Err(r.corrupt(format!(
            "header declares {zmlen} pairs, found {}",
            pairs.len()
        )));
    }
    Ok(pairs)
}

fn read_len(r: &mut PackedReader<'_>) -> PackedResult<usize> {
    match r.u8()? {
        ZIPMAP_BIGLEN => Ok(r.u32_le()? as usize),
        ZIPMAP_END => Err(r.corrupt("end marker in place of a length")),
        len => Ok(usize::from(len)),
    }
}

#[cfg(test)]
mod tests {
    use rdbkit_error::RdbErrorKind;

    use super::*;

    #[test]
    fn test_pairs_with_free_space() {
        let blob = Bytes::from_static(&[
            0x02, // zmlen
            0x03, b'f', b'o', b'o', 0x03, 0x02, b'b', b'a', b'r', 0x00, 0x00, // foo => bar + 2 free
            0x01, b'k', 0x01, 0x00, b'v', // k => v
            0xFF,
        ]);
        let pairs = parse_zipmap(&blob).unwrap();
        assert_eq!(
            pairs,
            vec![
                (Bytes::from("foo"), Bytes::from("bar")),
                (Bytes::from("k"), Bytes::from("v")),
            ]
        );
    }

    #[test]
    fn test_big_length() {
        let mut raw = vec![0x01, 0x01, b'k', 0xFE];
        raw.extend_from_slice(&300u32.to_le_bytes());
        raw.push(0x00);
        raw.extend(std::iter::repeat(b'v').take(300));
        raw.push(0xFF);
        let pairs = parse_zipmap(&Bytes::from(raw)).unwrap();
        assert_eq!(pairs[0].1.len(), 300);
    }

    #[test]
    fn test_missing_end() {
        let blob = Bytes::from_static(&[0x01, 0x01, b'k', 0x01, 0x00, b'v']);
        let err = parse_zipmap(&blob).unwrap_err();
        assert_eq!(err.kind(), RdbErrorKind::CorruptPayload);
    }
}
