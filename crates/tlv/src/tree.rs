//! Nested view of a BER-TLV buffer

use std::fmt;

use serde::Serialize;

use crate::ber::BerTlv;

/// One node of a decoded BER-TLV tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlvNode {
    /// Tag identifier octets
    #[serde(with = "hex::serde")]
    pub tag: Vec<u8>,
    /// Contents octets
    #[serde(with = "hex::serde")]
    pub value: Vec<u8>,
    /// Children of a constructed tag
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Self>,
}

/// Deepest level [`tree`] descends to; templates below it stay leaves
pub const MAX_DEPTH: usize = 32;

/// Decode `buf` into a tree, recursing into constructed (A0..BF) tags
///
/// Constructed tags nested deeper than [`MAX_DEPTH`] are kept as leaves
/// holding their undecoded value.
pub fn tree(buf: &[u8]) -> Vec<TlvNode> {
    tree_at(buf, 0)
}

fn tree_at(buf: &[u8], depth: usize) -> Vec<TlvNode> {
    BerTlv::new(buf)
        .map(|tlv| TlvNode {
            tag: tlv.id().to_vec(),
            value: tlv.data().to_vec(),
            children: if tlv.is_constructed() && depth < MAX_DEPTH {
                tree_at(tlv.raw(), depth + 1)
            } else {
                Vec::new()
            },
        })
        .collect()
}

impl TlvNode {
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        if self.children.is_empty() {
            writeln!(f, "{indent}{}: {}", hex::encode(&self.tag), hex::encode(&self.value))
        } else {
            writeln!(f, "{indent}{}:", hex::encode(&self.tag))?;
            for child in &self.children {
                child.write_indented(f, depth + 1)?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for TlvNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_tree_recurses_into_templates() {
        let fci = hex!("6f0f 8407a0000000031010 a504 500256 49");
        let nodes = tree(&fci);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].tag, hex!("84"));
        assert!(nodes[0].children.is_empty());

        assert_eq!(nodes[1].tag, hex!("a5"));
        assert_eq!(nodes[1].children.len(), 1);
        assert_eq!(nodes[1].children[0].tag, hex!("50"));
        assert_eq!(nodes[1].children[0].value, hex!("5649"));

        assert_eq!(nodes[1].to_string(), "a5:\n  50: 5649\n");
    }

    #[test]
    fn test_tree_serializes_hex() {
        let nodes = tree(&hex!("6f03 880101"));
        let json = serde_json::to_string(&nodes).unwrap();
        assert_eq!(json, r#"[{"tag":"88","value":"01"}]"#);
    }
}
