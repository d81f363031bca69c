//! Декодирование строк, чисел с плавающей точкой и значений всех
//! поддерживаемых типов.

use std::{
    collections::{HashMap, HashSet},
    io::Read,
};

use bytes::Bytes;
use ordered_float::OrderedFloat;
use rdbkit_error::{bail, ensure, RdbError, RdbResult};

use super::{
    compression::decompress_lzf,
    length::{read_length, read_plain_length, Length, StringEncoding},
    packed::{self, PackedResult},
    source::ByteSource,
    tags::ValueType,
    Value,
};

/// Значение по умолчанию для предела длины строки (как `proto-max-bulk-len`).
pub const DEFAULT_MAX_STRING_LEN: u64 = 512 * 1024 * 1024;
/// Значение по умолчанию для предела числа элементов коллекции.
pub const DEFAULT_MAX_COLLECTION_LEN: u64 = u32::MAX as u64;

/// Маркеры особых значений в текстовой записи double.
const R_NAN: u8 = 253;
const R_POS_INF: u8 = 254;
const R_NEG_INF: u8 = 255;

/// Контейнеры узлов quicklist 2.
const QUICKLIST_NODE_CONTAINER_PLAIN: u64 = 1;
const QUICKLIST_NODE_CONTAINER_PACKED: u64 = 2;

/// Пределы, защищающие от заявленных длин из повреждённого файла.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Максимальная длина строки (в т.ч. распакованной LZF и блоба)
    pub max_string_len: u64,
    /// Максимальное число элементов одной коллекции
    pub max_collection_len: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_collection_len: DEFAULT_MAX_COLLECTION_LEN,
        }
    }
}

/// Читает строку в любой из кодировок: обычной, целочисленной или LZF.
pub fn read_string<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
) -> RdbResult<Bytes> {
    let start = src.offset();
    match read_length(src)? {
        Length::Len(len) => {
            check_string_len(len, limits, start)?;
            src.read_bytes(len, "reading string")
        }
        Length::Encoded(StringEncoding::Int8) => {
            let v = src.read_u8("reading int8 string")? as i8;
            Ok(Bytes::from(v.to_string()))
        }
        Length::Encoded(StringEncoding::Int16) => {
            let v = i16::from_le_bytes(src.read_array("reading int16 string")?);
            Ok(Bytes::from(v.to_string()))
        }
        Length::Encoded(StringEncoding::Int32) => {
            let v = src.read_u32_le("reading int32 string")? as i32;
            Ok(Bytes::from(v.to_string()))
        }
        Length::Encoded(StringEncoding::Lzf) => {
            let compressed_len = read_plain_length(src, "lzf compressed length")?;
            let raw_len = read_plain_length(src, "lzf decompressed length")?;
            check_string_len(compressed_len, limits, start)?;
            check_string_len(raw_len, limits, start)?;
            let data = src.read_bytes(compressed_len, "reading lzf payload")?;
            let out = decompress_lzf(&data, raw_len as usize, start)?;
            Ok(Bytes::from(out))
        }
    }
}

/// Читает double в текстовой записи: байт длины и ASCII-число, либо маркер
/// `253` (NaN), `254` (+inf), `255` (-inf).
pub fn read_string_double<R: Read>(src: &mut ByteSource<R>) -> RdbResult<f64> {
    let start = src.offset();
    match src.read_u8("reading double length")? {
        R_NAN => Ok(f64::NAN),
        R_POS_INF => Ok(f64::INFINITY),
        R_NEG_INF => Ok(f64::NEG_INFINITY),
        len => {
            let text = src.read_bytes(u64::from(len), "reading double")?;
            parse_double(&text).map_err(|e| e.with_offset(start).into())
        }
    }
}

/// Читает значение указанного типа.
pub fn read_value<R: Read>(
    src: &mut ByteSource<R>,
    value_type: ValueType,
    limits: &DecodeLimits,
) -> RdbResult<Value> {
    let start = src.offset();
    let value = match value_type {
        ValueType::String => Value::Str(read_string(src, limits)?),
        ValueType::List => Value::List(read_items(src, limits, "list")?),
        ValueType::Set => Value::Set(read_set(src, limits)?),
        ValueType::ZSet => Value::SortedSet(read_zset(src, limits, false)?),
        ValueType::ZSet2 => Value::SortedSet(read_zset(src, limits, true)?),
        ValueType::Hash => Value::Hash(read_hash(src, limits)?),
        ValueType::HashZipmap => {
            let (blob, at) = read_blob(src, limits)?;
            let pairs = packed_at(packed::parse_zipmap(&blob), at)?;
            Value::Hash(packed_at(packed::into_hash(pairs, "zipmap"), at)?)
        }
        ValueType::ListZiplist => {
            let (blob, at) = read_blob(src, limits)?;
            Value::List(packed_at(packed::parse_ziplist(&blob), at)?)
        }
        ValueType::SetIntset => {
            let (blob, at) = read_blob(src, limits)?;
            Value::Set(packed_at(packed::parse_intset(&blob), at)?)
        }
        ValueType::SetListpack => {
            let (blob, at) = read_blob(src, limits)?;
            let items = packed_at(packed::parse_listpack(&blob), at)?;
            Value::Set(packed_at(packed::unique_members(items, "listpack"), at)?)
        }
        ValueType::ZSetZiplist => {
            let (blob, at) = read_blob(src, limits)?;
            let items = packed_at(packed::parse_ziplist(&blob), at)?;
            Value::SortedSet(packed_at(scored_pairs(items, "ziplist"), at)?)
        }
        ValueType::ZSetListpack => {
            let (blob, at) = read_blob(src, limits)?;
            let items = packed_at(packed::parse_listpack(&blob), at)?;
            Value::SortedSet(packed_at(scored_pairs(items, "listpack"), at)?)
        }
        ValueType::HashZiplist => {
            let (blob, at) = read_blob(src, limits)?;
            let items = packed_at(packed::parse_ziplist(&blob), at)?;
            let pairs = packed_at(packed::into_pairs(items, "ziplist"), at)?;
            Value::Hash(packed_at(packed::into_hash(pairs, "ziplist"), at)?)
        }
        ValueType::HashListpack => {
            let (blob, at) = read_blob(src, limits)?;
            let items = packed_at(packed::parse_listpack(&blob), at)?;
            let pairs = packed_at(packed::into_pairs(items, "listpack"), at)?;
            Value::Hash(packed_at(packed::into_hash(pairs, "listpack"), at)?)
        }
        ValueType::ListQuicklist => Value::List(read_quicklist(src, limits)?),
        ValueType::ListQuicklist2 => Value::List(read_quicklist2(src, limits)?),
        other => bail!(RdbError::UnsupportedType {
            tag: other as u8,
            offset: Some(start),
            key: None,
        }),
    };
    Ok(value)
}

fn check_string_len(
    len: u64,
    limits: &DecodeLimits,
    offset: u64,
) -> RdbResult<()> {
    ensure!(
        len <= limits.max_string_len,
        RdbError::corrupt(
            "string",
            format!("length {len} exceeds limit {}", limits.max_string_len),
            offset,
        )
    );
    Ok(())
}

fn read_collection_len<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
    what: &'static str,
) -> RdbResult<u64> {
    let start = src.offset();
    let len = read_plain_length(src, what)?;
    check_collection_len(len, limits, what, start)?;
    Ok(len)
}

fn check_collection_len(
    len: u64,
    limits: &DecodeLimits,
    what: &'static str,
    offset: u64,
) -> RdbResult<()> {
    ensure!(
        len <= limits.max_collection_len,
        RdbError::corrupt(
            what,
            format!("{len} elements exceed limit {}", limits.max_collection_len),
            offset,
        )
    );
    Ok(())
}

/// Начальная ёмкость по заявленной длине, не доверяя ей полностью.
fn initial_capacity(len: u64) -> usize {
    len.min(1024) as usize
}

/// Читает компактный блоб, возвращая его и смещение начала.
fn read_blob<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
) -> RdbResult<(Bytes, u64)> {
    let at = src.offset();
    let blob = read_string(src, limits)?;
    Ok((blob, at))
}

fn packed_at<T>(
    res: PackedResult<T>,
    offset: u64,
) -> RdbResult<T> {
    res.map_err(|e| e.with_offset(offset).into())
}

fn parse_double(text: &[u8]) -> Result<f64, RdbError> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| RdbError::CorruptPayload {
            structure: "double".to_string(),
            reason: format!("not a number: {:?}", String::from_utf8_lossy(text)),
            offset: None,
            key: None,
        })
}

fn read_items<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
    what: &'static str,
) -> RdbResult<Vec<Bytes>> {
    let len = read_collection_len(src, limits, what)?;
    let mut items = Vec::with_capacity(initial_capacity(len));
    for _ in 0..len {
        items.push(read_string(src, limits)?);
    }
    Ok(items)
}

/// Множество: элементы не повторяются.
fn read_set<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
) -> RdbResult<Vec<Bytes>> {
    let len = read_collection_len(src, limits, "set")?;
    let mut seen = HashSet::with_capacity(initial_capacity(len));
    let mut items = Vec::with_capacity(initial_capacity(len));
    for _ in 0..len {
        let at = src.offset();
        let member = read_string(src, limits)?;
        ensure!(
            seen.insert(member.clone()),
            packed::duplicate("set", "set member", &member).with_offset(at)
        );
        items.push(member);
    }
    Ok(items)
}

fn read_zset<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
    binary_scores: bool,
) -> RdbResult<Vec<(Bytes, OrderedFloat<f64>)>> {
    let len = read_collection_len(src, limits, "zset")?;
    let mut seen = HashSet::with_capacity(initial_capacity(len));
    let mut items = Vec::with_capacity(initial_capacity(len));
    for _ in 0..len {
        let at = src.offset();
        let member = read_string(src, limits)?;
        ensure!(
            seen.insert(member.clone()),
            packed::duplicate("zset", "zset member", &member).with_offset(at)
        );
        let score = if binary_scores {
            src.read_f64_le("reading zset score")?
        } else {
            read_string_double(src)?
        };
        items.push((member, OrderedFloat(score)));
    }
    Ok(items)
}

fn read_hash<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
) -> RdbResult<HashMap<Bytes, Bytes>> {
    let len = read_collection_len(src, limits, "hash")?;
    let mut map = HashMap::with_capacity(initial_capacity(len));
    for _ in 0..len {
        let at = src.offset();
        let field = read_string(src, limits)?;
        let value = read_string(src, limits)?;
        ensure!(
            !map.contains_key(&field),
            packed::duplicate("hash", "hash field", &field).with_offset(at)
        );
        map.insert(field, value);
    }
    Ok(map)
}

/// Quicklist: последовательность ziplist-узлов.
fn read_quicklist<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
) -> RdbResult<Vec<Bytes>> {
    let nodes = read_collection_len(src, limits, "quicklist")?;
    let mut items = Vec::new();
    for _ in 0..nodes {
        let (blob, at) = read_blob(src, limits)?;
        items.extend(packed_at(packed::parse_ziplist(&blob), at)?);
        check_collection_len(items.len() as u64, limits, "quicklist", at)?;
    }
    Ok(items)
}

/// Quicklist 2: узлы с контейнером PLAIN (один элемент) или PACKED
/// (listpack).
fn read_quicklist2<R: Read>(
    src: &mut ByteSource<R>,
    limits: &DecodeLimits,
) -> RdbResult<Vec<Bytes>> {
    let nodes = read_collection_len(src, limits, "quicklist")?;
    let mut items = Vec::new();
    for _ in 0..nodes {
        let at = src.offset();
        let container = read_plain_length(src, "quicklist container")?;
        match container {
            QUICKLIST_NODE_CONTAINER_PLAIN => items.push(read_string(src, limits)?),
            QUICKLIST_NODE_CONTAINER_PACKED => {
                let (blob, blob_at) = read_blob(src, limits)?;
                items.extend(packed_at(packed::parse_listpack(&blob), blob_at)?);
            }
            other => bail!(RdbError::corrupt(
                "quicklist",
                format!("unknown node container {other}"),
                at,
            )),
        }
        check_collection_len(items.len() as u64, limits, "quicklist", at)?;
    }
    Ok(items)
}

/// Превращает плоский список `member, score, ...` в пары со score.
fn scored_pairs(
    items: Vec<Bytes>,
    structure: &'static str,
) -> PackedResult<Vec<(Bytes, OrderedFloat<f64>)>> {
    let pairs = packed::into_pairs(items, structure)?;
    let mut seen = HashSet::with_capacity(pairs.len());
    let mut scored = Vec::with_capacity(pairs.len());
    for (member, score) in pairs {
        if !seen.insert(member.clone()) {
            return Err(packed::duplicate(structure, "zset member", &member));
        }
        scored.push((member, OrderedFloat(parse_double(&score)?)));
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use rdbkit_error::RdbErrorKind;

    use super::*;
    use crate::rdb::packed::{listpack, ziplist};

    fn source(bytes: Vec<u8>) -> ByteSource<Cursor<Vec<u8>>> {
        ByteSource::new(Cursor::new(bytes))
    }

    /// Строка в обычной кодировке с 6-битной длиной.
    fn raw(s: &str) -> Vec<u8> {
        let mut out = vec![s.len() as u8];
        out.extend_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn test_integer_strings() {
        let mut src = source(vec![0xC0, 0xFB, 0xC1, 0x39, 0x30, 0xC2, 0x00, 0x00, 0x00, 0x80]);
        let limits = DecodeLimits::default();
        assert_eq!(read_string(&mut src, &limits).unwrap(), Bytes::from("-5"));
        assert_eq!(read_string(&mut src, &limits).unwrap(), Bytes::from("12345"));
        assert_eq!(read_string(&mut src, &limits).unwrap(), Bytes::from("-2147483648"));
    }

    #[test]
    fn test_lzf_string() {
        let original = "hello hello hello hello hello hello hello".repeat(4);
        let packed = lzf::compress(original.as_bytes()).unwrap();
        let mut bytes = vec![0xC3];
        bytes.extend_from_slice(&[0x40 | (packed.len() >> 8) as u8, packed.len() as u8]);
        bytes.extend_from_slice(&[0x40 | (original.len() >> 8) as u8, original.len() as u8]);
        bytes.extend_from_slice(&packed);

        let mut src = source(bytes);
        let out = read_string(&mut src, &DecodeLimits::default()).unwrap();
        assert_eq!(out, Bytes::from(original));
    }

    /// Тест проверяет, что длина больше предела отвергается до чтения.
    #[test]
    fn test_string_limit() {
        let mut src = source(vec![0x80, 0x00, 0x00, 0x10, 0x00]);
        let limits = DecodeLimits {
            max_string_len: 1024,
            ..DecodeLimits::default()
        };
        let err = read_string(&mut src, &limits).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
    }

    #[test]
    fn test_string_doubles() {
        let mut bytes = vec![253, 254, 255];
        bytes.extend(raw("3.25"));
        bytes.extend(raw("abc"));
        let mut src = source(bytes);
        assert!(read_string_double(&mut src).unwrap().is_nan());
        assert_eq!(read_string_double(&mut src).unwrap(), f64::INFINITY);
        assert_eq!(read_string_double(&mut src).unwrap(), f64::NEG_INFINITY);
        assert_eq!(read_string_double(&mut src).unwrap(), 3.25);
        let err = read_string_double(&mut src).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
    }

    #[test]
    fn test_plain_collections() {
        let mut bytes = vec![0x02];
        bytes.extend(raw("a"));
        bytes.extend(raw("b"));
        let mut src = source(bytes);
        let v = read_value(&mut src, ValueType::List, &DecodeLimits::default()).unwrap();
        assert_eq!(v, Value::List(vec![Bytes::from("a"), Bytes::from("b")]));

        let mut bytes = vec![0x01];
        bytes.extend(raw("m"));
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        let mut src = source(bytes);
        let v = read_value(&mut src, ValueType::ZSet2, &DecodeLimits::default()).unwrap();
        assert_eq!(v, Value::SortedSet(vec![(Bytes::from("m"), OrderedFloat(1.5))]));
    }

    /// Тест проверяет, что повтор элемента множества, sorted set или поля
    /// хэша считается повреждением, а не схлопывается.
    #[test]
    fn test_duplicate_members_are_corrupt() {
        let limits = DecodeLimits::default();

        let mut bytes = vec![0x02];
        bytes.extend(raw("f"));
        bytes.extend(raw("1"));
        bytes.extend(raw("f"));
        bytes.extend(raw("2"));
        let err = read_value(&mut source(bytes), ValueType::Hash, &limits).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
        assert!(err.to_string().contains("offset: 0x5"), "{err}");

        let mut bytes = vec![0x02];
        bytes.extend(raw("a"));
        bytes.extend(raw("a"));
        let err = read_value(&mut source(bytes), ValueType::Set, &limits).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));

        let mut bytes = vec![0x02];
        for _ in 0..2 {
            bytes.extend(raw("m"));
            bytes.extend_from_slice(&1.0f64.to_le_bytes());
        }
        let err = read_value(&mut source(bytes), ValueType::ZSet2, &limits).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));

        let zl = ziplist::build::ziplist(&[Ok("m"), Err(1), Ok("m"), Err(2)]);
        let mut bytes = vec![zl.len() as u8];
        bytes.extend_from_slice(&zl);
        let err = read_value(&mut source(bytes), ValueType::ZSetZiplist, &limits).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));

        // Повтор элементов списка допустим.
        let mut bytes = vec![0x02];
        bytes.extend(raw("a"));
        bytes.extend(raw("a"));
        let v = read_value(&mut source(bytes), ValueType::List, &limits).unwrap();
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_zset_ziplist_scores() {
        let zl = ziplist::build::ziplist(&[Ok("alice"), Err(10), Ok("bob"), Ok("2.5")]);
        let mut bytes = vec![zl.len() as u8];
        bytes.extend_from_slice(&zl);
        let mut src = source(bytes);
        let v = read_value(&mut src, ValueType::ZSetZiplist, &DecodeLimits::default()).unwrap();
        assert_eq!(
            v,
            Value::SortedSet(vec![
                (Bytes::from("alice"), OrderedFloat(10.0)),
                (Bytes::from("bob"), OrderedFloat(2.5)),
            ])
        );
    }

    #[test]
    fn test_quicklist2_plain_and_packed() {
        let lp = listpack::build::listpack(&[Ok("x"), Err(7)]);
        let mut bytes = vec![0x02, 0x01];
        bytes.extend(raw("plain"));
        bytes.push(0x02);
        bytes.push(lp.len() as u8);
        bytes.extend_from_slice(&lp);
        let mut src = source(bytes);
        let v = read_value(&mut src, ValueType::ListQuicklist2, &DecodeLimits::default()).unwrap();
        assert_eq!(
            v,
            Value::List(vec![Bytes::from("plain"), Bytes::from("x"), Bytes::from("7")])
        );
    }

    #[test]
    fn test_quicklist2_bad_container() {
        let mut src = source(vec![0x01, 0x03, 0x00]);
        let err = read_value(&mut src, ValueType::ListQuicklist2, &DecodeLimits::default())
            .unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
    }

    /// Тест проверяет, что ошибка внутри блоба несёт смещение блоба.
    #[test]
    fn test_packed_error_has_offset() {
        let mut src = source(vec![0x03, 0x01, 0x02, 0x03]);
        let err = read_value(&mut src, ValueType::SetIntset, &DecodeLimits::default()).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
        assert!(err.to_string().contains("offset: 0x0"), "{err}");
    }

    #[test]
    fn test_unsupported_types() {
        for tag in [ValueType::StreamListpacks, ValueType::Module2, ValueType::HashListpackEx] {
            let mut src = source(vec![0x00]);
            let err = read_value(&mut src, tag, &DecodeLimits::default()).unwrap_err();
            assert_eq!(err.rdb_kind(), Some(RdbErrorKind::UnsupportedType));
        }
    }

    #[test]
    fn test_collection_limit() {
        let mut src = source(vec![0x3F]);
        let limits = DecodeLimits {
            max_collection_len: 10,
            ..DecodeLimits::default()
        };
        let err = read_value(&mut src, ValueType::Set, &limits).unwrap_err();
        assert_eq!(err.rdb_kind(), Some(RdbErrorKind::CorruptPayload));
    }
}
