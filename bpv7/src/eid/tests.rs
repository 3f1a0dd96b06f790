use super::*;

fn roundtrip_str(s: &str) {
    let eid: Eid = s.parse().unwrap();
    assert_eq!(eid.to_string(), s);
}

fn roundtrip_cbor(eid: &Eid) {
    let data = cbor::encode::emit(eid);
    let parsed: Eid = cbor::decode::parse(&data).unwrap();
    assert_eq!(&parsed, eid);
    assert_eq!(cbor::encode::emit(&parsed), data);
}

#[test]
fn string_forms() {
    roundtrip_str("dtn:none");
    roundtrip_str("dtn://node-a/");
    roundtrip_str("dtn://node-a/app/sub");
    roundtrip_str("ipn:4.2");

    assert_eq!("dtn:none".parse::<Eid>().unwrap(), Eid::Null);
    assert!("dtn:nonsense".parse::<Eid>().is_err());
    assert!("dtn://".parse::<Eid>().is_err());
    assert!("dtn://node".parse::<Eid>().is_err());
    assert!("ipn:1".parse::<Eid>().is_err());
    assert!("udp://node/".parse::<Eid>().is_err());
    assert!("".parse::<Eid>().is_err());
}

#[test]
fn percent_encoded_node_name() {
    let eid: Eid = "dtn://node%20a/svc".parse().unwrap();
    match &eid {
        Eid::Dtn { node_name, demux } => {
            assert_eq!(&**node_name, "node a");
            assert_eq!(&**demux, "svc");
        }
        _ => panic!("expected dtn EID"),
    }
    assert_eq!(eid.to_string(), "dtn://node%20a/svc");
}

#[test]
fn cbor_forms() {
    roundtrip_cbor(&Eid::Null);
    roundtrip_cbor(&"dtn://node-a/app".parse().unwrap());
    roundtrip_cbor(&"ipn:977000.100".parse().unwrap());

    // dtn:none is [1, 0]
    assert_eq!(cbor::encode::emit(&Eid::Null), vec![0x82, 0x01, 0x00]);

    // unknown scheme is rejected
    let data = cbor::encode::emit_array(Some(2), |a| {
        a.emit(&3u64);
        a.emit(&0u64);
    });
    assert!(matches!(
        cbor::decode::parse::<Eid>(&data),
        Err(EidError::UnsupportedScheme(3))
    ));
}

#[test]
fn reserved_endpoints() {
    assert!(Eid::null().is_null());
    assert!(Eid::broadcast().is_broadcast());
    assert_eq!(Eid::broadcast().to_string(), "dtn://broadcast/");
    assert!(!"dtn://broadcast/svc".parse::<Eid>().unwrap().is_broadcast());
    roundtrip_cbor(&Eid::broadcast());
}

#[test]
fn node_matching() {
    let node: Eid = "dtn://node-a/".parse().unwrap();
    let app: Eid = "dtn://node-a/app".parse().unwrap();
    let other: Eid = "dtn://node-b/app".parse().unwrap();

    assert_eq!(app.node_id(), node);
    assert!(app.matches_node(&node));
    assert!(node.matches_node(&node));
    assert!(!other.matches_node(&node));
    assert!(!Eid::Null.matches_node(&node));

    let ipn_app: Eid = "ipn:7.42".parse().unwrap();
    let ipn_node: Eid = "ipn:7.0".parse().unwrap();
    assert!(ipn_app.matches_node(&ipn_node));
}
