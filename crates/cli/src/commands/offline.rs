use std::path::Path;

use anyhow::Context;
use farecard_card::RawCard;

use crate::utils::parse_hex;

/// Decode a saved [`RawCard`] dump and print it as JSON
pub(crate) fn parse_command(file: &Path) -> anyhow::Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let card: RawCard = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a card dump", file.display()))?;

    println!("{}", serde_json::to_string_pretty(&card.parse())?);
    Ok(())
}

/// Print the BER-TLV tree of a hex buffer
pub(crate) fn tlv_command(input: &str, json: bool) -> anyhow::Result<()> {
    let bytes = parse_hex(input)?;
    let nodes = farecard_tlv::tree(&bytes);

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
    } else if nodes.is_empty() {
        println!("No TLV data");
    } else {
        for node in &nodes {
            print!("{node}");
        }
    }
    Ok(())
}
