//! Canonical chain names.
//!
//! Exchanges label the same transfer rail differently ("BSC", "BEP20",
//! "Binance Smart Chain", "USDT-BSC" after prefix stripping, ...). Every
//! label goes through [`canonical_chain`] before two exchanges' networks are
//! compared; raw labels are never compared directly.
//!
//! Normalization:
//! 1. a parenthesised token wins, so `"Tether USD (TRC20)"` becomes `TRC20`;
//! 2. the label is upper-cased and reduced to ASCII letters and digits;
//! 3. the result is looked up in [`CHAIN_SYNONYMS`]; unknown labels keep
//!    their step-2 form.

/// `(normalized alias, canonical name)` pairs.
pub const CHAIN_SYNONYMS: &[(&str, &str)] = &[
    // Ethereum mainnet
    ("ETH", "ERC20"),
    ("ERC20", "ERC20"),
    ("ETHER", "ERC20"),
    ("ETHEREUM", "ERC20"),
    ("ETHERC20", "ERC20"),
    ("ETHEREUMERC20", "ERC20"),
    // BNB Smart Chain
    ("BSC", "BEP20"),
    ("BEP20", "BEP20"),
    ("BSCBEP20", "BEP20"),
    ("BNBSMARTCHAIN", "BEP20"),
    ("BNBSMARTCHAINBEP20", "BEP20"),
    ("BINANCESMARTCHAIN", "BEP20"),
    // BNB Beacon Chain
    ("BNB", "BEP2"),
    ("BEP2", "BEP2"),
    ("BNBBEACONCHAIN", "BEP2"),
    ("BNBBEACONCHAINBEP2", "BEP2"),
    // Tron
    ("TRX", "TRC20"),
    ("TRC20", "TRC20"),
    ("TRON", "TRC20"),
    ("TRONTRC20", "TRC20"),
    // Solana
    ("SOL", "SOL"),
    ("SOLANA", "SOL"),
    ("SPL", "SOL"),
    // Polygon PoS
    ("MATIC", "POLYGON"),
    ("POL", "POLYGON"),
    ("POLYGON", "POLYGON"),
    ("POLYGONPOS", "POLYGON"),
    // Arbitrum One
    ("ARB", "ARBITRUM"),
    ("ARBONE", "ARBITRUM"),
    ("ARBEVM", "ARBITRUM"),
    ("ARBITRUM", "ARBITRUM"),
    ("ARBITRUMONE", "ARBITRUM"),
    // Optimism
    ("OP", "OPTIMISM"),
    ("OPETH", "OPTIMISM"),
    ("OPTIMISM", "OPTIMISM"),
    // Avalanche C-Chain
    ("AVAXC", "AVAXC"),
    ("CCHAIN", "AVAXC"),
    ("AVAXCCHAIN", "AVAXC"),
    ("AVALANCHECCHAIN", "AVAXC"),
    // Base
    ("BASE", "BASE"),
    ("BASEETH", "BASE"),
    ("BASEEVM", "BASE"),
    // Native coins
    ("BTC", "BTC"),
    ("XBT", "BTC"),
    ("BITCOIN", "BTC"),
    ("LTC", "LTC"),
    ("LITECOIN", "LTC"),
    ("TON", "TON"),
    ("TONCOIN", "TON"),
    ("XRP", "XRP"),
    ("RIPPLE", "XRP"),
    ("DOGE", "DOGE"),
    ("XDG", "DOGE"),
    ("DOGECOIN", "DOGE"),
];

/// Map an exchange chain label to its canonical name.
pub fn canonical_chain(label: &str) -> String {
    let inner = parenthesised(label).unwrap_or(label);
    let normalized: String = inner
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    CHAIN_SYNONYMS
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or(normalized)
}

/// Whether `name` is one of the canonical names in [`CHAIN_SYNONYMS`].
pub fn is_canonical_chain(name: &str) -> bool {
    CHAIN_SYNONYMS.iter().any(|(_, canonical)| *canonical == name)
}

fn parenthesised(label: &str) -> Option<&str> {
    let open = label.find('(')?;
    let close = label[open + 1..].find(')')? + open + 1;
    let inner = label[open + 1..close].trim();
    (!inner.is_empty()).then_some(inner)
}
