//! Распаковка LZF-сжатых строк.
//!
//! Сервер сжимает строковые значения и компактные блобы алгоритмом LZF и
//! записывает длину сжатых данных и длину исходной строки. Загрузчик
//! распаковывает блок и проверяет, что результат имеет ровно заявленную
//! длину.

use rdbkit_error::{RdbError, RdbResult};

/// Верхняя граница степени сжатия LZF: самая длинная обратная ссылка
/// занимает 3 байта и разворачивается в 264.
const LZF_MAX_EXPANSION: usize = 128;

/// Распаковывает LZF-блок, который должен дать ровно `expected_len` байт.
///
/// `offset` — позиция начала сжатой строки, используется в ошибке.
pub fn decompress_lzf(
    data: &[u8],
    expected_len: usize,
    offset: u64,
) -> RdbResult<Vec<u8>> {
    if expected_len == 0 {
        return Err(RdbError::corrupt("lzf", "declared decompressed length is zero", offset).into());
    }
    if expected_len > data.len().saturating_mul(LZF_MAX_EXPANSION) {
        return Err(RdbError::corrupt(
            "lzf",
            format!(
                "{} compressed bytes cannot expand to {expected_len}",
                data.len()
            ),
            offset,
        )
        .into());
    }
    let out = lzf::decompress(data, expected_len)
        .map_err(|e| RdbError::corrupt("lzf", format!("{e:?}"), offset))?;
    if out.len() != expected_len {
        return Err(RdbError::corrupt(
            "lzf",
            format!(
                "decompressed {} bytes, expected {expected_len}",
                out.len()
            ),
            offset,
        )
        .into());
    }
    Ok(out)
}
