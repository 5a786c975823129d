use sha2::Digest;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Short checksum prefix used in human-facing listings.
pub fn checksum_prefix(checksum: &str) -> &str {
    &checksum[..checksum.len().min(16)]
}
