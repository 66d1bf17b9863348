use {
    hmac::{digest::InvalidLength, Hmac, Mac},
    sha2::Sha256,
};

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over `value` and return the lowercase hex digest.
#[inline]
pub(crate) fn hmac_sha256_hex(key: &[u8], value: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(value);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
