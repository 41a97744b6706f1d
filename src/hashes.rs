use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};
use std::fmt;

pub const FULL_HASH_BYTES: usize = 32;
pub const DEFAULT_PREFIX_BYTES: usize = 4;

/// A lookup expression together with its full digest and the truncated
/// prefix used for local membership tests.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedExpression {
    pub expression: String,
    pub full: [u8; FULL_HASH_BYTES],
    pub prefix: Vec<u8>,
}

impl HashedExpression {
    pub fn full_b64(&self) -> String {
        BASE64.encode(self.full)
    }

    pub fn prefix_b64(&self) -> String {
        BASE64.encode(&self.prefix)
    }
}

impl fmt::Debug for HashedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedExpression")
            .field("expression", &self.expression)
            .field("full", &hex::encode(self.full))
            .field("prefix", &hex::encode(&self.prefix))
            .finish()
    }
}

/// SHA-256 of the expression, truncated to the list's prefix width.
pub fn hash_expression(expression: &str, prefix_bytes: usize) -> HashedExpression {
    let digest = Sha256::digest(expression.as_bytes());
    let mut full = [0u8; FULL_HASH_BYTES];
    full.copy_from_slice(&digest);
    let width = prefix_bytes.clamp(DEFAULT_PREFIX_BYTES, FULL_HASH_BYTES);
    HashedExpression {
        expression: expression.to_string(),
        prefix: full[..width].to_vec(),
        full,
    }
}
