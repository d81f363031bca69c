//! Декодер снимков RDB.
//!
//! Слои снизу вверх:
//! - [`source`] — буферизованное чтение с учётом смещения и CRC64;
//! - [`length`], [`compression`], [`packed`] — длины, LZF и компактные
//!   кодировки;
//! - [`decode`] — строки и значения всех поддерживаемых типов;
//! - [`streaming`] — разбор опкодов и обработчики записей;
//! - [`loader`] — загрузка файла целиком с проверкой трейлера.

pub mod checksum;
pub mod compression;
pub mod decode;
pub mod file;
pub mod length;
pub mod loader;
pub mod packed;
pub mod record;
pub mod source;
pub mod streaming;
pub mod tags;

pub use checksum::*;
pub use decode::{read_string, read_string_double, read_value, DecodeLimits};
pub use file::*;
pub use loader::*;
pub use record::*;
pub use source::ByteSource;
pub use streaming::*;
pub use tags::{Opcode, ValueType};
