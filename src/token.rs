use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy per access token (256 bits).
pub const ACCESS_TOKEN_BYTES: usize = 32;

/// Generates a fresh access token: 32 bytes from the OS CSPRNG, lowercase hex encoded.
///
/// Uniqueness is enforced by the unique index on `purchases.access_token`, not here.
pub fn generate_access_token() -> String {
    let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
