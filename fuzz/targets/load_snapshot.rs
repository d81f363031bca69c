#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use rdbkit::{load_reader, rdb::DecodeLimits, CollectHandler, LoadOptions, Record};

fuzz_target!(|data: &[u8]| {
    // Корректный заголовок, чтобы фаззер сразу шёл в поток записей.
    let mut bytes = b"REDIS0011".to_vec();
    bytes.extend_from_slice(data);

    let options = LoadOptions {
        limits: DecodeLimits {
            max_string_len: 1 << 20,
            max_collection_len: 1 << 16,
        },
        ..LoadOptions::default()
    };

    let mut handler = CollectHandler::new();
    match load_reader(Cursor::new(&bytes), &options, &mut handler) {
        Ok(report) => {
            let keys = handler
                .records()
                .iter()
                .filter(|r| matches!(r, Record::KeyValue(_)))
                .count() as u64;
            assert_eq!(report.stats.keys, keys);
            assert!(report.stats.bytes_read <= bytes.len() as u64);
        }
        Err(err) => {
            // Любая ошибка загрузчика относится к одному из видов.
            assert!(err.rdb_kind().is_some(), "untyped error: {err}");
        }
    }
});
