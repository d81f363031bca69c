use std::{fmt, panic::Location, sync::Arc};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::{ErrorExt, LogLevel, RdbError, RdbErrorKind, StatusCode};

/// Ошибка загрузки с корневой причиной и цепочкой контекстов.
///
/// Корень хранится за `Arc<dyn ErrorExt>` и не меняется при подъёме по
/// стеку; вызывающий код добавляет только контексты вида
/// `"decoding value"`, `"loading dump.rdb"`. Исключение — [`map_rdb`],
/// которым декодер дописывает ключ в уже созданную [`RdbError`].
///
/// [`map_rdb`]: StackError::map_rdb
#[derive(Clone)]
pub struct StackError {
    inner: Arc<dyn ErrorExt>,
    contexts: Arc<Vec<ErrorContext>>,
}

/// Один уровень контекста и место, где он добавлен.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub message: String,
    pub location: Option<&'static Location<'static>>,
}

/// Машиночитаемый отчёт об ошибке (для JSON-вывода CLI).
#[cfg(feature = "serde")]
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub code: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl StackError {
    pub fn new<E: ErrorExt>(err: E) -> Self {
        Self {
            inner: Arc::new(err),
            contexts: Arc::new(Vec::new()),
        }
    }

    /// Добавляет уровень контекста.
    #[track_caller]
    pub fn context(
        mut self,
        msg: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.contexts).push(ErrorContext {
            message: msg.into(),
            location: Some(Location::caller()),
        });
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.inner.status_code()
    }

    /// Короткое сообщение корневой ошибки без offset и контекстов.
    pub fn client_message(&self) -> String {
        self.inner.client_message()
    }

    /// Контексты от самого внутреннего к внешнему.
    pub fn contexts(&self) -> &[ErrorContext] {
        &self.contexts
    }

    pub fn downcast_ref<T: ErrorExt + 'static>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Вид ошибки загрузки, если корнем является [`RdbError`].
    ///
    /// Ошибки, пришедшие из пользовательского обработчика записей, возвращают
    /// `None` и передаются без изменений.
    pub fn rdb_kind(&self) -> Option<RdbErrorKind> {
        self.downcast_ref::<RdbError>().map(RdbError::kind)
    }

    /// Подсказка оператору для ошибок формата.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        self.downcast_ref::<RdbError>()
            .and_then(RdbError::recovery_hint)
    }

    /// Преобразует корневую [`RdbError`] (например, добавляет ключ),
    /// сохраняя цепочку контекстов. Прочие ошибки возвращаются как есть.
    pub fn map_rdb(
        self,
        f: impl FnOnce(RdbError) -> RdbError,
    ) -> Self {
        let mapped = match self.downcast_ref::<RdbError>() {
            Some(err) => f(err.clone()),
            None => return self,
        };
        Self {
            inner: Arc::new(mapped),
            contexts: self.contexts,
        }
    }

    /// Уровень, с которым загрузчик пишет эту ошибку в лог.
    pub fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    /// Отчёт для машиночитаемого вывода.
    #[cfg(feature = "serde")]
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.status_code().code(),
            kind: self.rdb_kind().map(|k| format!("{k:?}")),
            message: self.client_message(),
            detail: self.inner.to_string(),
            contexts: self.contexts.iter().map(|c| c.message.clone()).collect(),
            hint: self.recovery_hint(),
        }
    }

    fn located_contexts(&self) -> Vec<String> {
        self.contexts
            .iter()
            .map(|ctx| match ctx.location {
                Some(loc) => format!("{} ({}:{})", ctx.message, loc.file(), loc.line()),
                None => ctx.message.clone(),
            })
            .collect()
    }
}

impl fmt::Debug for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut debug = f.debug_struct("StackError");
        debug.field("inner", &self.inner.log_message());
        debug.field("status_code", &self.status_code());
        if !self.contexts.is_empty() {
            debug.field("contexts", &self.located_contexts());
        }
        debug.finish()
    }
}

/// Внешний контекст печатается первым: `loading dump.rdb → decoding value → <root>`.
impl fmt::Display for StackError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for ctx in self.contexts.iter().rev() {
            write!(f, "{} → ", ctx.message)?;
        }
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl<E: ErrorExt> From<E> for StackError {
    #[track_caller]
    fn from(e: E) -> Self {
        StackError::new(e)
    }
}

impl From<StackError> for std::io::Error {
    fn from(e: StackError) -> Self {
        std::io::Error::other(e.to_string())
    }
}
