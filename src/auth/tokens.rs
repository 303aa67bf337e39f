use rand::{rngs::OsRng, RngCore};

/// Bytes of entropy behind every verification/reset token.
const TOKEN_BYTES: usize = 32;

/// Opaque single-use token for email verification and password reset links.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
