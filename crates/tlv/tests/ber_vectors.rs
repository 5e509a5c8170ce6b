//! BER-TLV decoding against hand-built buffers

use farecard_tlv::{BerTlv, find, find_repeated};
use hex_literal::hex;

/// `51` wrapping "hello world"
const CHILD: [u8; 13] = hex!("510b68656c6c6f20776f726c64");

fn only_child(buf: &[u8]) {
    let items: Vec<_> = BerTlv::new(buf).collect();
    assert_eq!(items.len(), 1, "buffer {}", hex::encode(buf));
    assert_eq!(items[0].id(), &[0x51]);
    assert_eq!(items[0].header(), &hex!("510b"));
    assert_eq!(items[0].data(), b"hello world");
    assert_eq!(items[0].raw(), &CHILD);
}

fn wrap(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    [prefix, &CHILD, suffix].concat()
}

#[test]
fn short_form_length() {
    only_child(&wrap(&hex!("500e"), &[]));
}

#[test]
fn indefinite_length() {
    only_child(&wrap(&hex!("5080"), &hex!("0000")));
}

#[test]
fn long_form_one_byte() {
    only_child(&wrap(&hex!("50810e"), &[]));
}

#[test]
fn long_form_seven_bytes() {
    only_child(&wrap(&hex!("50870000000000000e"), &[]));
}

#[test]
fn long_form_with_zero_padding() {
    let mut prefix = hex!("50fe").to_vec();
    prefix.extend(std::iter::repeat_n(0u8, 125));
    prefix.push(0x0e);
    only_child(&wrap(&prefix, &[]));
}

#[test]
fn oversized_length_yields_nothing() {
    let buf = wrap(&hex!("5088ffffffffffffffff"), &[]);
    assert_eq!(BerTlv::new(&buf).count(), 0);
}

#[test]
fn trailing_tag_with_truncated_value() {
    let buf = hex!("5010510b68656c6c6f20776f726c645201");
    let items: Vec<_> = BerTlv::new(&buf).collect();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].id(), &[0x52]);
    assert_eq!(items[1].header(), &hex!("5201"));
    assert!(items[1].data().is_empty());
}

#[test]
fn padding_is_skipped() {
    only_child(&wrap(&hex!("0000500f00"), &hex!("0000")));
}

#[test]
fn short_long_and_nested_in_document_order() {
    // 6f { 84 short, 9f08 long-form, a5 { 88 } }
    let buf = hex!("6f11 8402aabb 9f088102ccdd a505 880301 0203");
    let items: Vec<_> = BerTlv::new(&buf).collect();
    let triples: Vec<_> = items
        .iter()
        .map(|t| (t.id().to_vec(), t.header().to_vec(), t.data().to_vec()))
        .collect();
    assert_eq!(
        triples,
        vec![
            (hex!("84").to_vec(), hex!("8402").to_vec(), hex!("aabb").to_vec()),
            (hex!("9f08").to_vec(), hex!("9f0881 02").to_vec(), hex!("ccdd").to_vec()),
            (hex!("a5").to_vec(), hex!("a505").to_vec(), hex!("8803010203").to_vec()),
        ]
    );

    assert!(items[2].is_constructed());
    let nested: Vec<_> = BerTlv::new(items[2].raw()).collect();
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].id(), &[0x88]);
    assert_eq!(nested[0].data(), &hex!("010203"));

    // Restartable: a fresh pass and a cloned iterator see the same sequence
    let again: Vec<_> = BerTlv::new(&buf).collect();
    assert_eq!(items, again);
    let iter = BerTlv::new(&buf);
    assert_eq!(iter.clone().count(), iter.count());
}

#[test]
fn multihead_walks_sibling_containers() {
    let buf = hex!("7003 800101 7004 8102aabb");
    assert_eq!(BerTlv::new(&buf).count(), 1);

    let ids: Vec<_> = BerTlv::multihead(&buf).map(|t| t.id().to_vec()).collect();
    assert_eq!(ids, vec![vec![0x80], vec![0x81]]);

    assert_eq!(find(&buf, &[0x81], false, false), None);
    assert_eq!(find(&buf, &[0x81], false, true), Some(&hex!("aabb")[..]));
}

#[test]
fn find_repeated_collects_all() {
    let buf = hex!("7009 800101 800102 81010f");
    let values: Vec<_> = find_repeated(&buf, &[0x80], false).collect();
    assert_eq!(values, vec![&[0x01][..], &[0x02][..]]);
    let with_header: Vec<_> = find_repeated(&buf, &[0x81], true).collect();
    assert_eq!(with_header, vec![&hex!("81010f")[..]]);
}
