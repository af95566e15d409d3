pub mod serde;

/// Lower-case `0x` hex of raw bytes, the text form of byte fields in queries.
pub fn hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}
