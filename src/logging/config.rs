use serde::{Deserialize, Serialize};

/// Формат вывода логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Многострочный вывод для разработки
    Pretty,
    /// Однострочный вывод
    #[default]
    Compact,
    /// JSON по строке на событие
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Уровень для событий загрузчика: trace, debug, info, warn, error
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Цвета ANSI в консоли
    #[serde(default = "default_true")]
    pub with_ansi: bool,
    /// Показывать target события
    #[serde(default = "default_false")]
    pub with_target: bool,
    /// Показывать номер строки
    #[serde(default = "default_false")]
    pub with_line_numbers: bool,
    /// Дополнительные директивы EnvFilter (например `"rdbkit::rdb=trace"`)
    #[serde(default)]
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            with_ansi: true,
            with_target: false,
            with_line_numbers: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Директива EnvFilter из конфигурации: уровень для крейта плюс
    /// дополнительные директивы.
    pub fn build_filter_directive(&self) -> String {
        let mut parts = vec![format!("warn,rdbkit={}", self.level)];
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }

    /// Проверяет уровень логирования.
    pub fn validate(&self) -> Result<(), String> {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
            other => Err(format!("invalid log level: {other}")),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}
