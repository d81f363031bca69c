//! Централизованная система ошибок rdbkit.
//!
//! Все ошибки загрузчика приводятся к [`StackError`], который хранит корневую
//! ошибку и цепочку контекстов. Для форматных ошибок снимка корнем является
//! [`RdbError`], вид которой возвращает [`StackError::rdb_kind`].

pub mod ext;
pub mod macros;
pub mod stack;
pub mod status_code;
pub mod types;

// Публичный экспорт всех типов ошибок и функций из вложенных модулей,
// чтобы упростить доступ к ним из внешнего кода.
pub use ext::*;
pub use macros::*;
pub use stack::*;
pub use status_code::*;
pub use types::*;

pub type RdbResult<T> = Result<T, StackError>;
