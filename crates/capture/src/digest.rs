use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

pub const DIGEST_LEN: usize = 20;

/// SHA-1 of a shader blob; the content address used for dumps and for
/// selecting the injection target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderDigest([u8; DIGEST_LEN]);

impl ShaderDigest {
    pub fn of(bytes: &[u8]) -> Self {
        let hash = Sha1::digest(bytes);
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&hash);
        Self(out)
    }

    pub fn of_words(words: &[u32]) -> Self {
        Self::of(bytemuck::cast_slice(words))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ShaderDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ShaderDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShaderDigest({})", self.to_hex())
    }
}

impl FromStr for ShaderDigest {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.len() != DIGEST_LEN * 2 {
            return Err(format!(
                "expected {} hex characters, got {} in '{trimmed}'",
                DIGEST_LEN * 2,
                trimmed.len()
            ));
        }
        let mut out = [0u8; DIGEST_LEN];
        hex::decode_to_slice(trimmed, &mut out)
            .map_err(|err| format!("invalid digest '{trimmed}': {err}"))?;
        Ok(Self(out))
    }
}
