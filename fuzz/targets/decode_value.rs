#![no_main]

use std::io::Cursor;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rdbkit::{
    rdb::{read_value, ByteSource, DecodeLimits},
    ValueType,
};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    tag: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(value_type) = ValueType::try_from(input.tag) else {
        return;
    };
    let limits = DecodeLimits {
        max_string_len: 1 << 20,
        max_collection_len: 1 << 16,
    };

    let mut src = ByteSource::new(Cursor::new(&input.data));
    if let Ok(value) = read_value(&mut src, value_type, &limits) {
        // Смещение источника не выходит за пределы входа.
        assert!(src.offset() <= input.data.len() as u64);
        let _ = value.type_name();
    }
});
