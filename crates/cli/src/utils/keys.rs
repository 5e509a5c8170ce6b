//! Key material for `scan --keys`

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use farecard_card::{CardKeys, ClassicKey, KeyFile, KeyProvider};

/// Keys from a Proxmark3 dump, offered to every card
#[derive(Debug)]
struct DumpKeys(CardKeys);

impl KeyProvider for DumpKeys {
    fn keys_for_tag(&self, _tag_id_hex: &str) -> Option<CardKeys> {
        Some(self.0.clone())
    }

    fn global_keys(&self) -> Option<Vec<ClassicKey>> {
        None
    }
}

/// Load a JSON key file, or anything else as a Proxmark3 binary dump
pub(crate) fn load_keys(path: &Path) -> anyhow::Result<Arc<dyn KeyProvider>> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        let file = KeyFile::load(path)
            .with_context(|| format!("Failed to load keys from {}", path.display()))?;
        return Ok(Arc::new(file));
    }

    let dump = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let keys = CardKeys::from_proxmark3(&dump)
        .with_context(|| format!("{} is not a key dump", path.display()))?;
    Ok(Arc::new(DumpKeys(keys)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_keys_apply_to_any_card() {
        let dump: Vec<u8> = [[0xA0; 6], [0xA1; 6], [0xB0; 6], [0xB1; 6]].concat();
        let provider = DumpKeys(CardKeys::from_proxmark3(&dump).unwrap());

        let keys = provider.keys_for_tag("04a1b2c3").unwrap();
        assert_eq!(keys.keys().len(), 2);
        assert_eq!(keys.key_for_sector(1).unwrap().key_a, [0xA1; 6]);
        assert_eq!(keys.key_for_sector(1).unwrap().key_b, [0xB1; 6]);
        assert!(provider.global_keys().is_none());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_keys(Path::new("/nonexistent/keys.json")).is_err());
        assert!(load_keys(Path::new("/nonexistent/keys.bin")).is_err());
    }
}
