//! Кодирование длин.
//!
//! Старшие два бита первого байта выбирают форму:
//!
//! | биты | форма                                                   |
//! |------|---------------------------------------------------------|
//! | `00` | 6-битная длина в этом же байте                          |
//! | `01` | 14-битная длина, big-endian вместе со следующим байтом  |
//! | `10` | `0x80` — 32 бита BE, `0x81` — 64 бита BE                |
//! | `11` | специальная кодировка строки (целое или LZF)            |

use std::io::Read;

use rdbkit_error::{RdbError, RdbResult};

use super::source::ByteSource;

pub const RDB_6BITLEN: u8 = 0;
pub const RDB_14BITLEN: u8 = 1;
pub const RDB_ENCVAL: u8 = 3;
pub const RDB_32BITLEN: u8 = 0x80;
pub const RDB_64BITLEN: u8 = 0x81;

pub const RDB_ENC_INT8: u8 = 0;
pub const RDB_ENC_INT16: u8 = 1;
pub const RDB_ENC_INT32: u8 = 2;
pub const RDB_ENC_LZF: u8 = 3;

/// Специальные кодировки строк.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Int8,
    Int16,
    Int32,
    Lzf,
}

/// Результат чтения длины.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// Обычная длина
    Len(u64),
    /// Маркер специальной кодировки строки
    Encoded(StringEncoding),
}

/// Читает длину или маркер специальной кодировки.
pub fn read_length<R: Read>(src: &mut ByteSource<R>) -> RdbResult<Length> {
    let start = src.offset();
    let first = src.read_u8("reading length")?;
    let len = match first >> 6 {
        RDB_6BITLEN => u64::from(first & 0x3F),
        RDB_14BITLEN => {
            let next = src.read_u8("reading 14-bit length")?;
            (u64::from(first & 0x3F) << 8) | u64::from(next)
        }
        RDB_ENCVAL => {
            let encoding = match first & 0x3F {
                RDB_ENC_INT8 => StringEncoding::Int8,
                RDB_ENC_INT16 => StringEncoding::Int16,
                RDB_ENC_INT32 => StringEncoding::Int32,
                RDB_ENC_LZF => StringEncoding::Lzf,
                other => {
                    return Err(RdbError::corrupt(
                        "length",
                        format!("unknown string encoding {other}"),
                        start,
                    )
                    .into())
                }
            };
            return Ok(Length::Encoded(encoding));
        }
        _ => match first {
            RDB_32BITLEN => u64::from(src.read_u32_be("reading 32-bit length")?),
            RDB_64BITLEN => src.read_u64_be("reading 64-bit length")?,
            other => {
                return Err(RdbError::corrupt(
                    "length",
                    format!("unknown length prefix 0x{other:02X}"),
                    start,
                )
                .into())
            }
        },
    };
    Ok(Length::Len(len))
}

/// Читает длину там, где специальная кодировка недопустима (размеры
/// коллекций, номера БД, счётчики).
pub fn read_plain_length<R: Read>(
    src: &mut ByteSource<R>,
    what: &'static str,
) -> RdbResult<u64> {
    let start = src.offset();
    match read_length(src)? {
        Length::Len(len) => Ok(len),
        Length::Encoded(encoding) => Err(RdbError::corrupt(
            what,
            format!("expected a plain length, found {encoding:?} marker"),
            start,
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rdbkit_error::RdbErrorKind;
    use rstest::rstest;

    use super::*;

    fn parse(bytes: &[u8]) -> RdbResult<Length> {
        let mut src = ByteSource::new(Cursor::new(bytes.to_vec()));
        read_length(&mut src)
    }

    #[rstest]
    #[case(&[0x00], 0)]
    #[case(&[0x3F], 63)]
    #[case(&[0x40, 0x40], 64)]
    #[case(&[0x7F, 0xFF], 16383)]
    #[case(&[0x80, 0x00, 0x01, 0x00, 0x00], 65536)]
    #[case(&[0x81, 0, 0, 0, 1, 0, 0, 0, 0], 1 << 32)]
    fn test_plain_lengths(
        #[case] bytes: &[u8],
        #[case] expected: u64,
    ) {
        assert_eq!(parse(bytes).unwrap(), Length::Len(expected));
    }

    #[rstest]
    #[case(0xC0, StringEncoding::Int8)]
    #[case(0xC1, StringEncoding::Int16)]
    #[case(0xC2, StringEncoding::Int32)]
    #[case(0xC3, StringEncoding::Lzf)]
    fn test_encoded_markers(
        #[case] byte: u8,
        #[case] expected: StringEncoding,
    ) {
        assert_eq!(parse(&[byte]).unwrap(), Length::Encoded(expected));
    }

    #[test]
    fn test_unknown_forms_are_corrupt() {
        let err = parse(&[0x82]).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
        let err = parse(&[0xC4]).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
    }

    #[test]
    fn test_truncated_length() {
        let err = parse(&[0x80, 0x00]).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::Truncated));
    }

    #[test]
    fn test_plain_length_rejects_marker() {
        let mut src = ByteSource::new(Cursor::new(vec![0xC0u8, 0x01]));
        let err = read_plain_length(&mut src, "list length").unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
    }
}
