//! Сборщик снимков RDB для тестов.
//!
//! Пишет байты так же, как их пишет сервер: длины, строки с целочисленной
//! кодировкой и LZF, компактные блобы, трейлер с CRC64.
#![allow(dead_code)]

use std::io::Write;

use rdbkit::rdb::CRC64_REDIS;
use tempfile::NamedTempFile;

/// Кодирует длину в формате RDB.
pub fn encode_length(n: u64) -> Vec<u8> {
    if n < 1 << 6 {
        vec![n as u8]
    } else if n < 1 << 14 {
        vec![0x40 | (n >> 8) as u8, n as u8]
    } else if n <= u64::from(u32::MAX) {
        let mut out = vec![0x80];
        out.extend_from_slice(&(n as u32).to_be_bytes());
        out
    } else {
        let mut out = vec![0x81];
        out.extend_from_slice(&n.to_be_bytes());
        out
    }
}

/// Строка без сжатия и без целочисленной кодировки.
pub fn encode_raw(s: &[u8]) -> Vec<u8> {
    let mut out = encode_length(s.len() as u64);
    out.extend_from_slice(s);
    out
}

/// Целое в самой короткой из кодировок int8/int16/int32.
pub fn encode_int(n: i32) -> Vec<u8> {
    if let Ok(v) = i8::try_from(n) {
        vec![0xC0, v as u8]
    } else if let Ok(v) = i16::try_from(n) {
        let mut out = vec![0xC1];
        out.extend_from_slice(&v.to_le_bytes());
        out
    } else {
        let mut out = vec![0xC2];
        out.extend_from_slice(&n.to_le_bytes());
        out
    }
}

/// Строка, сжатая LZF.
pub fn encode_lzf(s: &[u8]) -> Vec<u8> {
    let compressed = lzf::compress(s).unwrap_or_else(|_| literal_lzf(s));
    let mut out = vec![0xC3];
    out.extend(encode_length(compressed.len() as u64));
    out.extend(encode_length(s.len() as u64));
    out.extend(compressed);
    out
}

/// LZF-поток только из литералов (для несжимаемых входов).
fn literal_lzf(s: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + s.len() / 32 + 1);
    for chunk in s.chunks(32) {
        out.push((chunk.len() - 1) as u8);
        out.extend_from_slice(chunk);
    }
    out
}

/// Ziplist из записей; записи, похожие на i64, кодируются целыми.
pub fn ziplist(entries: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    let mut prev = 0usize;
    let mut tail = 10usize;
    for entry in entries {
        let start = body.len();
        tail = 10 + start;
        if prev < 254 {
            body.push(prev as u8);
        } else {
            body.push(0xFE);
            body.extend_from_slice(&(prev as u32).to_le_bytes());
        }
        match canonical_int(entry) {
            Some(n) => {
                body.push(0xC0 | 0x20);
                body.extend_from_slice(&n.to_le_bytes());
            }
            None if entry.len() < 64 => {
                body.push(entry.len() as u8);
                body.extend_from_slice(entry.as_bytes());
            }
            None if entry.len() < 1 << 14 => {
                body.push(0x40 | (entry.len() >> 8) as u8);
                body.push(entry.len() as u8);
                body.extend_from_slice(entry.as_bytes());
            }
            None => {
                body.push(0x80);
                body.extend_from_slice(&(entry.len() as u32).to_be_bytes());
                body.extend_from_slice(entry.as_bytes());
            }
        }
        prev = body.len() - start;
    }
    let total = 10 + body.len() + 1;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(tail as u32).to_le_bytes());
    out.extend_from_slice(&(entries.len().min(0xFFFF) as u16).to_le_bytes());
    out.extend(body);
    out.push(0xFF);
    out
}

/// Listpack из записей; записи, похожие на i64, кодируются целыми.
pub fn listpack(entries: &[&str]) -> Vec<u8> {
    let mut body = Vec::new();
    for entry in entries {
        let start = body.len();
        match canonical_int(entry) {
            Some(n) if (0..=127).contains(&n) => body.push(n as u8),
            Some(n) => {
                body.push(0xF4);
                body.extend_from_slice(&n.to_le_bytes());
            }
            None if entry.len() < 64 => {
                body.push(0x80 | entry.len() as u8);
                body.extend_from_slice(entry.as_bytes());
            }
            None if entry.len() < 1 << 12 => {
                body.push(0xE0 | (entry.len() >> 8) as u8);
                body.push(entry.len() as u8);
                body.extend_from_slice(entry.as_bytes());
            }
            None => {
                body.push(0xF0);
                body.extend_from_slice(&(entry.len() as u32).to_le_bytes());
                body.extend_from_slice(entry.as_bytes());
            }
        }
        let len = body.len() - start;
        body.extend(backlen(len));
    }
    let total = 6 + body.len() + 1;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(entries.len().min(0xFFFF) as u16).to_le_bytes());
    out.extend(body);
    out.push(0xFF);
    out
}

/// Обратная длина записи listpack: 7-битные группы от старшей к младшей,
/// все байты кроме первого с битом 0x80.
fn backlen(len: usize) -> Vec<u8> {
    let mut groups = vec![(len & 0x7F) as u8];
    let mut rest = len >> 7;
    while rest > 0 {
        groups.push((rest & 0x7F) as u8);
        rest >>= 7;
    }
    groups.reverse();
    for g in groups.iter_mut().skip(1) {
        *g |= 0x80;
    }
    groups
}

/// Intset заданной ширины (2, 4 или 8 байт).
pub fn intset(
    width: u32,
    values: &[i64],
) -> Vec<u8> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let mut out = Vec::new();
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&(sorted.len() as u32).to_le_bytes());
    for v in sorted {
        match width {
            2 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            4 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            _ => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
    out
}

/// Zipmap из коротких пар.
pub fn zipmap(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut out = vec![pairs.len().min(253) as u8];
    for (field, value) in pairs {
        out.push(field.len() as u8);
        out.extend_from_slice(field.as_bytes());
        out.push(value.len() as u8);
        out.push(0);
        out.extend_from_slice(value.as_bytes());
    }
    out.push(0xFF);
    out
}

fn canonical_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().filter(|n| n.to_string() == s)
}

/// Построитель файла снимка.
#[derive(Debug, Clone)]
pub struct RdbBuilder {
    version: u32,
    buf: Vec<u8>,
}

impl RdbBuilder {
    /// Начинает файл с заголовка `REDIS` + версия.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            buf: format!("REDIS{version:04}").into_bytes(),
        }
    }

    /// Текущая длина файла.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn raw(
        mut self,
        bytes: &[u8],
    ) -> Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn aux(
        self,
        key: &str,
        value: &str,
    ) -> Self {
        let mut body = vec![0xFA];
        body.extend(encode_raw(key.as_bytes()));
        body.extend(encode_raw(value.as_bytes()));
        self.raw(&body)
    }

    pub fn select_db(
        self,
        index: u64,
    ) -> Self {
        let mut body = vec![0xFE];
        body.extend(encode_length(index));
        self.raw(&body)
    }

    pub fn resize_db(
        self,
        db_size: u64,
        expires_size: u64,
    ) -> Self {
        let mut body = vec![0xFB];
        body.extend(encode_length(db_size));
        body.extend(encode_length(expires_size));
        self.raw(&body)
    }

    pub fn slot_info(
        self,
        slot_id: u64,
        slot_size: u64,
        expires: u64,
    ) -> Self {
        let mut body = vec![0xF4];
        body.extend(encode_length(slot_id));
        body.extend(encode_length(slot_size));
        body.extend(encode_length(expires));
        self.raw(&body)
    }

    pub fn function(
        self,
        code: &str,
    ) -> Self {
        let mut body = vec![0xF5];
        body.extend(encode_raw(code.as_bytes()));
        self.raw(&body)
    }

    pub fn expire_ms(
        self,
        ts: u64,
    ) -> Self {
        let mut body = vec![0xFC];
        body.extend_from_slice(&ts.to_le_bytes());
        self.raw(&body)
    }

    pub fn expire_s(
        self,
        ts: u32,
    ) -> Self {
        let mut body = vec![0xFD];
        body.extend_from_slice(&ts.to_le_bytes());
        self.raw(&body)
    }

    pub fn idle(
        self,
        secs: u64,
    ) -> Self {
        let mut body = vec![0xF8];
        body.extend(encode_length(secs));
        self.raw(&body)
    }

    pub fn freq(
        self,
        freq: u8,
    ) -> Self {
        self.raw(&[0xF9, freq])
    }

    /// Пара ключ/значение с произвольным телом значения.
    pub fn value(
        self,
        tag: u8,
        key: &[u8],
        payload: &[u8],
    ) -> Self {
        let mut body = vec![tag];
        body.extend(encode_raw(key));
        body.extend_from_slice(payload);
        self.raw(&body)
    }

    pub fn string(
        self,
        key: &str,
        value: &[u8],
    ) -> Self {
        self.value(0, key.as_bytes(), &encode_raw(value))
    }

    pub fn int_string(
        self,
        key: &str,
        value: i32,
    ) -> Self {
        self.value(0, key.as_bytes(), &encode_int(value))
    }

    pub fn lzf_string(
        self,
        key: &str,
        value: &[u8],
    ) -> Self {
        self.value(0, key.as_bytes(), &encode_lzf(value))
    }

    pub fn list(
        self,
        key: &str,
        items: &[&str],
    ) -> Self {
        let mut payload = encode_length(items.len() as u64);
        for item in items {
            payload.extend(encode_raw(item.as_bytes()));
        }
        self.value(1, key.as_bytes(), &payload)
    }

    pub fn set(
        self,
        key: &str,
        members: &[&str],
    ) -> Self {
        let mut payload = encode_length(members.len() as u64);
        for m in members {
            payload.extend(encode_raw(m.as_bytes()));
        }
        self.value(2, key.as_bytes(), &payload)
    }

    /// Sorted set с текстовыми счётами (тег 3).
    pub fn zset(
        self,
        key: &str,
        members: &[(&str, f64)],
    ) -> Self {
        let mut payload = encode_length(members.len() as u64);
        for (m, score) in members {
            payload.extend(encode_raw(m.as_bytes()));
            if score.is_nan() {
                payload.push(253);
            } else if *score == f64::INFINITY {
                payload.push(254);
            } else if *score == f64::NEG_INFINITY {
                payload.push(255);
            } else {
                let text = score.to_string();
                payload.push(text.len() as u8);
                payload.extend_from_slice(text.as_bytes());
            }
        }
        self.value(3, key.as_bytes(), &payload)
    }

    /// Sorted set с двоичными счётами (тег 5).
    pub fn zset2(
        self,
        key: &str,
        members: &[(&str, f64)],
    ) -> Self {
        let mut payload = encode_length(members.len() as u64);
        for (m, score) in members {
            payload.extend(encode_raw(m.as_bytes()));
            payload.extend_from_slice(&score.to_le_bytes());
        }
        self.value(5, key.as_bytes(), &payload)
    }

    pub fn hash(
        self,
        key: &str,
        pairs: &[(&str, &str)],
    ) -> Self {
        let mut payload = encode_length(pairs.len() as u64);
        for (f, v) in pairs {
            payload.extend(encode_raw(f.as_bytes()));
            payload.extend(encode_raw(v.as_bytes()));
        }
        self.value(4, key.as_bytes(), &payload)
    }

    /// Значение-блоб компактной кодировки с заданным тегом.
    pub fn blob(
        self,
        tag: u8,
        key: &str,
        blob: &[u8],
    ) -> Self {
        self.value(tag, key.as_bytes(), &encode_raw(blob))
    }

    /// Quicklist (тег 14) из ziplist-узлов.
    pub fn quicklist(
        self,
        key: &str,
        nodes: &[&[&str]],
    ) -> Self {
        let mut payload = encode_length(nodes.len() as u64);
        for node in nodes {
            payload.extend(encode_raw(&ziplist(node)));
        }
        self.value(14, key.as_bytes(), &payload)
    }

    /// Quicklist 2 (тег 18): `Ok` — PACKED listpack, `Err` — PLAIN элемент.
    pub fn quicklist2(
        self,
        key: &str,
        nodes: &[Result<&[&str], &str>],
    ) -> Self {
        let mut payload = encode_length(nodes.len() as u64);
        for node in nodes {
            match node {
                Ok(items) => {
                    payload.extend(encode_length(2));
                    payload.extend(encode_raw(&listpack(items)));
                }
                Err(item) => {
                    payload.extend(encode_length(1));
                    payload.extend(encode_raw(item.as_bytes()));
                }
            }
        }
        self.value(18, key.as_bytes(), &payload)
    }

    /// Тело без опкода `EOF` и без трейлера.
    pub fn unterminated(self) -> Vec<u8> {
        self.buf
    }

    /// `EOF` и корректный трейлер (для версий с трейлером).
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.push(0xFF);
        if self.version >= 5 {
            let crc = CRC64_REDIS.checksum(&self.buf);
            self.buf.extend_from_slice(&crc.to_le_bytes());
        }
        self.buf
    }

    /// `EOF` и заданное значение трейлера.
    pub fn finish_with_checksum(
        mut self,
        stored: u64,
    ) -> Vec<u8> {
        self.buf.push(0xFF);
        self.buf.extend_from_slice(&stored.to_le_bytes());
        self.buf
    }

    /// `EOF` без трейлера.
    pub fn finish_without_trailer(mut self) -> Vec<u8> {
        self.buf.push(0xFF);
        self.buf
    }
}

/// Записывает снимок во временный файл.
pub fn write_temp(bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("dump-")
        .suffix(".rdb")
        .tempfile()
        .expect("create temp file");
    file.write_all(bytes).expect("write snapshot");
    file.flush().expect("flush snapshot");
    file
}
