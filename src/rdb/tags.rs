//! Опкоды и теги типов значений бинарного формата RDB.
//!
//! Первый байт каждой записи потока — либо управляющий опкод (`0xF4..=0xFF`),
//! либо тег типа значения (`0..=25`), за которым следует пара ключ/значение.
//! Значения совпадают бит-в-бит с форматом сервера.

use num_enum::TryFromPrimitive;

/// Информация о слоте кластера (RDB 12)
pub const RDB_OPCODE_SLOT_INFO: u8 = 0xF4;
/// Библиотека функций (RDB 10+)
pub const RDB_OPCODE_FUNCTION2: u8 = 0xF5;
/// Библиотека функций, pre-GA формат
pub const RDB_OPCODE_FUNCTION_PRE_GA: u8 = 0xF6;
/// Вспомогательные данные модуля
pub const RDB_OPCODE_MODULE_AUX: u8 = 0xF7;
/// LRU idle time следующего ключа
pub const RDB_OPCODE_IDLE: u8 = 0xF8;
/// LFU частота следующего ключа
pub const RDB_OPCODE_FREQ: u8 = 0xF9;
/// Метаданные (aux field)
pub const RDB_OPCODE_AUX: u8 = 0xFA;
/// Подсказка размеров текущей БД
pub const RDB_OPCODE_RESIZEDB: u8 = 0xFB;
/// Время истечения следующего ключа в миллисекундах
pub const RDB_OPCODE_EXPIRETIME_MS: u8 = 0xFC;
/// Время истечения следующего ключа в секундах
pub const RDB_OPCODE_EXPIRETIME: u8 = 0xFD;
/// Выбор БД
pub const RDB_OPCODE_SELECTDB: u8 = 0xFE;
/// Конец потока записей
pub const RDB_OPCODE_EOF: u8 = 0xFF;

/// Управляющие опкоды потока.
///
/// Пространство опкодов фиксировано форматом, поэтому диспетчеризация —
/// закрытый `match` по этому перечислению.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Opcode {
    SlotInfo = RDB_OPCODE_SLOT_INFO,
    Function2 = RDB_OPCODE_FUNCTION2,
    FunctionPreGa = RDB_OPCODE_FUNCTION_PRE_GA,
    ModuleAux = RDB_OPCODE_MODULE_AUX,
    Idle = RDB_OPCODE_IDLE,
    Freq = RDB_OPCODE_FREQ,
    Aux = RDB_OPCODE_AUX,
    ResizeDb = RDB_OPCODE_RESIZEDB,
    ExpireTimeMs = RDB_OPCODE_EXPIRETIME_MS,
    ExpireTime = RDB_OPCODE_EXPIRETIME,
    SelectDb = RDB_OPCODE_SELECTDB,
    Eof = RDB_OPCODE_EOF,
}

/// Теги типов значений.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum ValueType {
    String = 0,
    List = 1,
    Set = 2,
    ZSet = 3,
    Hash = 4,
    /// ZSet с бинарными double (RDB 8+)
    ZSet2 = 5,
    ModulePreGa = 6,
    Module2 = 7,
    HashZipmap = 9,
    ListZiplist = 10,
    SetIntset = 11,
    ZSetZiplist = 12,
    HashZiplist = 13,
    ListQuicklist = 14,
    StreamListpacks = 15,
    HashListpack = 16,
    ZSetListpack = 17,
    ListQuicklist2 = 18,
    StreamListpacks2 = 19,
    SetListpack = 20,
    StreamListpacks3 = 21,
    HashMetadataPreGa = 22,
    HashListpackExPreGa = 23,
    HashMetadata = 24,
    HashListpackEx = 25,
}

impl ValueType {
    /// Умеет ли загрузчик декодировать значение этого типа.
    ///
    /// Модули, стримы и хэши с TTL полей распознаются, но их раскладка не
    /// декодируется.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            Self::ModulePreGa
                | Self::Module2
                | Self::StreamListpacks
                | Self::StreamListpacks2
                | Self::StreamListpacks3
                | Self::HashMetadataPreGa
                | Self::HashListpackExPreGa
                | Self::HashMetadata
                | Self::HashListpackEx
        )
    }

    /// Логическое имя типа (как в команде `TYPE`).
    pub fn logical_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::List | Self::ListZiplist | Self::ListQuicklist | Self::ListQuicklist2 => "list",
            Self::Set | Self::SetIntset | Self::SetListpack => "set",
            Self::ZSet | Self::ZSet2 | Self::ZSetZiplist | Self::ZSetListpack => "zset",
            Self::Hash
            | Self::HashZipmap
            | Self::HashZiplist
            | Self::HashListpack
            | Self::HashMetadataPreGa
            | Self::HashListpackExPreGa
            | Self::HashMetadata
            | Self::HashListpackEx => "hash",
            Self::ModulePreGa | Self::Module2 => "module",
            Self::StreamListpacks | Self::StreamListpacks2 | Self::StreamListpacks3 => "stream",
        }
    }
}
