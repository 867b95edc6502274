//! Address classification and normalization — shared by the Provenance
//! Manager (constraint normalization, spec.md §4.5) and the Sanctions Index
//! (membership lookups, spec.md §4.10/§6). The core defines these rules; it
//! never fetches or parses a sanctions feed itself.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    Evm,
    Solana,
    Bitcoin,
    Unknown,
}

static EVM_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());
static BITCOIN_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(1[1-9A-HJ-NP-Za-km-z]{25,34}|3[1-9A-HJ-NP-Za-km-z]{25,34}|bc1[0-9a-z]{25,59})$")
        .unwrap()
});
static SOLANA_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap());

/// Classify an address's format family by shape alone — no network lookups.
pub fn classify(address: &str) -> ChainFamily {
    if EVM_ADDRESS.is_match(address) {
        ChainFamily::Evm
    } else if BITCOIN_ADDRESS.is_match(address) {
        ChainFamily::Bitcoin
    } else if SOLANA_ADDRESS.is_match(address) {
        ChainFamily::Solana
    } else {
        ChainFamily::Unknown
    }
}

/// Normalization rule (spec.md §3): EVM addresses lowercased; non-EVM
/// preserve case.
pub fn normalize(address: &str) -> String {
    match classify(address) {
        ChainFamily::Evm => address.to_lowercase(),
        _ => address.to_string(),
    }
}

pub fn is_evm_format(address: &str) -> bool {
    classify(address) == ChainFamily::Evm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_addresses_are_lowercased() {
        assert_eq!(normalize("0xABCDEF0123456789ABCDEF0123456789ABCDEF01"), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn non_evm_addresses_preserve_case() {
        let btc = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
        assert_eq!(normalize(btc), btc);
    }

    #[test]
    fn classifies_evm_vs_unknown() {
        assert_eq!(classify("0x0000000000000000000000000000000000000000"), ChainFamily::Evm);
        assert_eq!(classify("not-an-address"), ChainFamily::Unknown);
    }
}
