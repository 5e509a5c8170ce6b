//! Helpers shared by the commands

mod keys;

pub(crate) use keys::load_keys;

/// Decode hex, ignoring whitespace and `:` separators
pub(crate) fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    Ok(hex::decode(digits)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_separators() {
        assert_eq!(parse_hex("6f 0d:A5").unwrap(), vec![0x6f, 0x0d, 0xa5]);
        assert!(parse_hex("6f0").is_err());
    }
}
