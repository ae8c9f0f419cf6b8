/// Syntactic check for a bech32 address: expected prefix, separator, and
/// data charset. Deliberately checksum-free; the node remains the authority
/// on address validity.
pub fn verify_address_syntax(s: &str, hrp: &str) -> bool {
    let Some(data) = s.strip_prefix(hrp).and_then(|rest| rest.strip_prefix('1')) else {
        return false;
    };
    if data.len() < 6 || s.len() > 90 {
        return false;
    }
    const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
    data.bytes().all(|b| CHARSET.contains(&b.to_ascii_lowercase()))
}
