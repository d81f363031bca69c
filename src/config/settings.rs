use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{
    logging::LoggingConfig,
    rdb::{
        decode::{DEFAULT_MAX_COLLECTION_LEN, DEFAULT_MAX_STRING_LEN},
        source::DEFAULT_READ_BUFFER,
        DecodeLimits, LoadOptions,
    },
};

/// Префикс переменных окружения: `RDBKIT_LOADER__VERIFY_CHECKSUM=false`.
pub const ENV_PREFIX: &str = "RDBKIT";

/// Настройки загрузчика.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderSettings {
    pub verify_checksum: bool,
    pub allow_missing_trailer: bool,
    pub max_string_len: u64,
    pub max_collection_len: u64,
    pub read_buffer: usize,
}

/// Полная конфигурация: файл (опционально), затем переменные окружения.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default)]
    pub loader: LoaderSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            allow_missing_trailer: false,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_collection_len: DEFAULT_MAX_COLLECTION_LEN,
            read_buffer: DEFAULT_READ_BUFFER,
        }
    }
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и окружения.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Загружает настройки, накладывая файл `path` (формат по расширению)
    /// и переменные окружения поверх значений по умолчанию.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Значения по умолчанию
            .set_default("loader.verify_checksum", true)?
            .set_default("loader.allow_missing_trailer", false)?
            .set_default("loader.max_string_len", DEFAULT_MAX_STRING_LEN as i64)?
            .set_default("loader.max_collection_len", DEFAULT_MAX_COLLECTION_LEN as i64)?
            .set_default("loader.read_buffer", DEFAULT_READ_BUFFER as i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "compact")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            // Переменные окружения с префиксом RDBKIT_
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

impl From<&LoaderSettings> for LoadOptions {
    fn from(s: &LoaderSettings) -> Self {
        LoadOptions {
            verify_checksum: s.verify_checksum,
            allow_missing_trailer: s.allow_missing_trailer,
            limits: DecodeLimits {
                max_string_len: s.max_string_len,
                max_collection_len: s.max_collection_len,
            },
            read_buffer: s.read_buffer,
        }
    }
}
