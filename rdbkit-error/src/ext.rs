use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок загрузчика (object-safe).
///
/// Позволяет [`StackError`](crate::StackError) хранить любую ошибку за
/// `Arc<dyn ErrorExt>` и при этом:
/// - получать статус-код для классификации,
/// - формировать короткое сообщение для оператора,
/// - выполнять downcast к конкретному типу.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код статуса ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`], чтобы можно было выполнить downcast.
    fn as_any(&self) -> &dyn Any;

    /// Короткое сообщение без диагностических деталей (offset и т.п.).
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }
}
