use super::encode::*;

#[test]
fn uint_shortest_form() {
    assert_eq!(emit(&0u64), vec![0x00]);
    assert_eq!(emit(&23u64), vec![0x17]);
    assert_eq!(emit(&24u64), vec![0x18, 0x18]);
    assert_eq!(emit(&255u64), vec![0x18, 0xFF]);
    assert_eq!(emit(&256u64), vec![0x19, 0x01, 0x00]);
    assert_eq!(emit(&65536u64), vec![0x1A, 0x00, 0x01, 0x00, 0x00]);
    assert_eq!(
        emit(&(u32::MAX as u64 + 1)),
        vec![0x1B, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
    );
}

#[test]
fn strings() {
    assert_eq!(emit("a"), vec![0x61, b'a']);
    assert_eq!(emit(&[1u8, 2, 3][..]), vec![0x43, 1, 2, 3]);
    assert_eq!(emit(&Vec::<u8>::new()), vec![0x40]);
}

#[test]
fn bools() {
    assert_eq!(emit(&false), vec![0xF4]);
    assert_eq!(emit(&true), vec![0xF5]);
}

#[test]
fn definite_array() {
    let data = emit_array(Some(3), |a| {
        a.emit(&1u64);
        a.emit(&2u64);
        a.emit(&3u64);
    });
    assert_eq!(data, vec![0x83, 1, 2, 3]);
}

#[test]
fn indefinite_array() {
    let data = emit_array(None, |a| {
        a.emit(&1u64);
        a.emit(&2u64);
    });
    assert_eq!(data, vec![0x9F, 1, 2, 0xFF]);
}

#[test]
fn nested_array() {
    let data = emit_array(Some(2), |a| {
        a.emit(&1u64);
        a.emit_array(Some(2), |a| {
            a.emit(&2u64);
            a.emit(&3u64);
        });
    });
    assert_eq!(data, vec![0x82, 1, 0x82, 2, 3]);
}

#[test]
fn skip_value_accounts_for_patched_item() {
    let mut data = emit_array(Some(2), |a| {
        a.emit(&7u64);
        a.skip_value();
    });
    data.push(0x08);
    assert_eq!(data, vec![0x82, 7, 8]);
}

#[test]
#[should_panic]
fn definite_array_overflow_panics() {
    emit_array(Some(1), |a| {
        a.emit(&1u64);
        a.emit(&2u64);
    });
}

#[test]
#[should_panic]
fn definite_array_underflow_panics() {
    emit_array(Some(2), |a| {
        a.emit(&1u64);
    });
}

#[test]
fn byte_string_headers() {
    assert_eq!(byte_string_header(0), vec![0x40]);
    assert_eq!(byte_string_header(23), vec![0x57]);
    assert_eq!(byte_string_header(24), vec![0x58, 24]);
    assert_eq!(byte_string_header(1000), vec![0x59, 0x03, 0xE8]);
}
