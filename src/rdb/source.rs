//! Побайтовый источник снимка.
//!
//! [`ByteSource`] оборачивает любой `Read`, буферизует его, считает смещение
//! и на лету обновляет CRC64 по каждому выданному байту. Все чтения точные:
//! если источник закончился раньше, чем получено запрошенное число байт,
//! возвращается `Truncated` со смещением начала чтения.

use std::io::{self, BufReader, Read};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use rdbkit_error::{RdbError, RdbResult};

use super::checksum::Crc64;

/// Размер буфера чтения по умолчанию.
pub const DEFAULT_READ_BUFFER: usize = 64 * 1024;

/// Порция, которой читаются длинные строки. Заявленная длина из повреждённого
/// файла не приводит к выделению памяти под всю длину сразу.
const READ_CHUNK: usize = 64 * 1024;

/// Буферизованный источник с учётом смещения и CRC64.
pub struct ByteSource<R: Read> {
    inner: BufReader<R>,
    crc: Crc64,
    offset: u64,
}

impl<R: Read> ByteSource<R> {
    /// Создаёт источник с буфером по умолчанию.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(DEFAULT_READ_BUFFER, reader)
    }

    /// Создаёт источник с буфером заданного размера.
    pub fn with_capacity(
        capacity: usize,
        reader: R,
    ) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity.max(1), reader),
            crc: Crc64::new(),
            offset: 0,
        }
    }

    /// Кол-во байт, выданных из источника.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// CRC64 всех выданных байт (кроме трейлера).
    pub fn checksum(&self) -> u64 {
        self.crc.current()
    }

    /// Читает байт на границе записи.
    ///
    /// В отличие от остальных методов, конец источника здесь не ошибка:
    /// возвращается `None`, и решение принимает вызывающий код.
    pub fn next_opcode(&mut self) -> RdbResult<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.consume(&byte);
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(RdbError::from(e).with_offset(self.offset).into()),
            }
        }
    }

    /// Читает ровно `N` байт.
    pub fn read_array<const N: usize>(
        &mut self,
        context: &'static str,
    ) -> RdbResult<[u8; N]> {
        let mut buf = [0u8; N];
        let start = self.offset;
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| map_read_error(e, context, start))?;
        self.consume(&buf);
        Ok(buf)
    }

    pub fn read_u8(
        &mut self,
        context: &'static str,
    ) -> RdbResult<u8> {
        Ok(self.read_array::<1>(context)?[0])
    }

    pub fn read_u32_le(
        &mut self,
        context: &'static str,
    ) -> RdbResult<u32> {
        Ok(LittleEndian::read_u32(&self.read_array::<4>(context)?))
    }

    pub fn read_u64_le(
        &mut self,
        context: &'static str,
    ) -> RdbResult<u64> {
        Ok(LittleEndian::read_u64(&self.read_array::<8>(context)?))
    }

    pub fn read_u32_be(
        &mut self,
        context: &'static str,
    ) -> RdbResult<u32> {
        Ok(BigEndian::read_u32(&self.read_array::<4>(context)?))
    }

    pub fn read_u64_be(
        &mut self,
        context: &'static str,
    ) -> RdbResult<u64> {
        Ok(BigEndian::read_u64(&self.read_array::<8>(context)?))
    }

    /// Читает IEEE-754 double в little-endian.
    pub fn read_f64_le(
        &mut self,
        context: &'static str,
    ) -> RdbResult<f64> {
        Ok(LittleEndian::read_f64(&self.read_array::<8>(context)?))
    }

    /// Читает ровно `len` байт.
    ///
    /// Буфер растёт по мере поступления данных, поэтому обрыв файла после
    /// огромной заявленной длины обнаруживается без выделения этой длины.
    pub fn read_bytes(
        &mut self,
        len: u64,
        context: &'static str,
    ) -> RdbResult<Bytes> {
        let start = self.offset;
        let capacity = usize::try_from(len).unwrap_or(usize::MAX).min(READ_CHUNK);
        let mut buf = Vec::with_capacity(capacity);
        let got = (&mut self.inner)
            .take(len)
            .read_to_end(&mut buf)
            .map_err(|e| map_read_error(e, context, start))?;
        self.consume(&buf);
        if (got as u64) < len {
            return Err(RdbError::truncated(context, start).into());
        }
        Ok(Bytes::from(buf))
    }

    /// Читает 8 байт трейлера, не включая их в CRC64.
    pub fn read_trailer(&mut self) -> RdbResult<u64> {
        let mut buf = [0u8; 8];
        let start = self.offset;
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| map_read_error(e, "reading checksum trailer", start))?;
        self.offset += buf.len() as u64;
        Ok(LittleEndian::read_u64(&buf))
    }

    fn consume(
        &mut self,
        bytes: &[u8],
    ) {
        self.crc.update(bytes);
        self.offset += bytes.len() as u64;
    }
}

fn map_read_error(
    err: io::Error,
    context: &'static str,
    offset: u64,
) -> RdbError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => RdbError::truncated(context, offset),
        _ => RdbError::from(err),
    }
}
