use ethers::types::{Address, H256};

const SNOWTRACE_URL: &str = "https://snowtrace.io";

// https://snowtrace.io/tx/0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef
pub fn tx(tx_hash: &H256) -> String {
    format!("{SNOWTRACE_URL}/tx/{tx_hash:#x}")
}

// https://snowtrace.io/address/0x1234567890abcdef1234567890abcdef12345678
pub fn address(address: &Address) -> String {
    format!("{SNOWTRACE_URL}/address/{address:#x}")
}

/// First characters of a checksum-less address, for compact reports.
pub fn short_address(address: &Address) -> String {
    let full = format!("{address:#x}");
    full[..7].to_string()
}
