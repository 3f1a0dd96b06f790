use super::{decode, decode::*, encode};

#[test]
fn uints() {
    assert_eq!(decode::parse::<u64>(&[0x00]).unwrap(), 0);
    assert_eq!(decode::parse::<u64>(&[0x17]).unwrap(), 23);
    assert_eq!(decode::parse::<u64>(&[0x18, 0x18]).unwrap(), 24);
    assert_eq!(decode::parse::<u64>(&[0x19, 0x01, 0x00]).unwrap(), 256);
}

#[test]
fn truncated_input() {
    assert_eq!(decode::try_parse::<u64>(&[0x19, 0x01]).unwrap(), None);
    assert_eq!(decode::try_parse::<Vec<u8>>(&[0x43, 1, 2]).unwrap(), None);
    assert!(matches!(
        decode::parse::<u64>(&[]),
        Err(Error::NotEnoughData)
    ));
}

#[test]
fn wrong_type() {
    assert!(matches!(
        decode::parse::<u64>(&[0x40]),
        Err(Error::IncorrectType(..))
    ));
}

#[test]
fn definite_array() {
    let (sum, len) = decode::parse_array(&[0x83, 1, 2, 3], |a, _| {
        let mut sum = 0u64;
        while let Some(n) = a.try_parse::<u64>()? {
            sum += n;
        }
        Ok::<_, Error>(sum)
    })
    .unwrap();
    assert_eq!(sum, 6);
    assert_eq!(len, 4);
}

#[test]
fn indefinite_array_with_break() {
    let (items, _) = decode::parse_array(&[0x9F, 1, 2, 0xFF], |a, _| {
        assert!(!a.is_definite());
        let mut items = Vec::new();
        while let Some(n) = a.try_parse::<u64>()? {
            items.push(n);
        }
        Ok::<_, Error>(items)
    })
    .unwrap();
    assert_eq!(items, vec![1, 2]);
}

#[test]
fn array_under_consumption_fails() {
    let r: Result<(u64, usize), Error> = decode::parse_array(&[0x82, 1, 2], |a, _| a.parse());
    assert!(matches!(r, Err(Error::MoreItems)));
}

#[test]
fn indefinite_string_rejected() {
    assert!(matches!(
        decode::parse::<Vec<u8>>(&[0x5F, 0x41, 1, 0xFF]),
        Err(Error::IndefiniteLength(_))
    ));
}

#[test]
fn maps_and_tags_rejected() {
    assert!(matches!(
        decode::parse::<u64>(&[0xA0]),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        decode::parse::<u64>(&[0xC1, 0x00]),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn text() {
    assert_eq!(decode::parse::<String>(&[0x61, b'a']).unwrap(), "a");
    assert!(matches!(
        decode::parse::<String>(&[0x61, 0xFF]),
        Err(Error::InvalidUtf8)
    ));
}

#[test]
fn byte_string_header_roundtrip() {
    for len in [0u64, 1, 23, 24, 255, 256, 65536] {
        let header = encode::byte_string_header(len);
        let (parsed, hlen) = decode::parse_byte_string_header(&header).unwrap().unwrap();
        assert_eq!(parsed, len);
        assert_eq!(hlen, header.len());
    }
    assert_eq!(decode::parse_byte_string_header(&[0x59, 0x01]).unwrap(), None);
    assert!(decode::parse_byte_string_header(&[0x83]).is_err());
}

#[test]
fn nested_arrays() {
    let data = encode::emit_array(Some(2), |a| {
        a.emit(&9u64);
        a.emit_array(Some(2), |a| {
            a.emit(&1u64);
            a.emit(&2u64);
        });
    });
    let ((outer, inner), _) = decode::parse_array(&data, |a, _| {
        let outer = a.parse::<u64>()?;
        let inner = a.parse_array(|a, _| {
            let x = a.parse::<u64>()?;
            let y = a.parse::<u64>()?;
            Ok::<_, Error>((x, y))
        })?;
        Ok::<_, Error>((outer, inner))
    })
    .unwrap();
    assert_eq!(outer, 9);
    assert_eq!(inner, (1, 2));
}
