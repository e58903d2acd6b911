//! Identity fingerprinting.
//!
//! A fingerprint is the lowercase-hex digest of a point's ordered
//! identity fields (schema or metric name, tag and property pairs, and
//! for flattened samples the aggregation operation). The algorithm is
//! picked per data transformer; SHAKE-class algorithms additionally take
//! the output width from the configuration.

use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use sha3::digest::{ExtendableOutput, Update, XofReader};
use sha3::{Shake128, Shake256};

use crate::config::DataTransformerConfig;
use crate::error::Result;
use crate::point::FlatOperation;

/// Digest algorithms available for fingerprinting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Shake128,
    Shake256,
}

impl HashAlgorithm {
    /// True for extendable-output (XOF) algorithms, which require an
    /// explicit output size.
    pub fn is_extendable(self) -> bool {
        matches!(self, Self::Shake128 | Self::Shake256)
    }
}

/// One identity field fed into the fingerprint hash.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HashField<'a> {
    Text(&'a str),
    Float(f64),
    Integer(i64),
    Operation(FlatOperation),
}

/// Field separator inside the hash input. Keeps `["ab", "c"]` and
/// `["a", "bc"]` from colliding.
const FIELD_SEPARATOR: u8 = 0x1f;

fn feed(out: &mut impl FnMut(&[u8]), fields: &[HashField<'_>]) {
    for field in fields {
        match field {
            HashField::Text(v) => out(v.as_bytes()),
            HashField::Float(v) => out(&v.to_bits().to_be_bytes()),
            HashField::Integer(v) => out(&v.to_be_bytes()),
            HashField::Operation(op) => out(&[op.id()]),
        }
        out(&[FIELD_SEPARATOR]);
    }
}

/// Computes the hex fingerprint of the given identity fields using the
/// transformer's configured algorithm.
pub(crate) fn fingerprint(
    config: &DataTransformerConfig,
    fields: &[HashField<'_>],
) -> Result<String> {
    let digest = match config.hashing_algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            feed(&mut |bytes| Digest::update(&mut hasher, bytes), fields);
            hasher.finalize().to_vec()
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            feed(&mut |bytes| Digest::update(&mut hasher, bytes), fields);
            hasher.finalize().to_vec()
        }
        HashAlgorithm::Shake128 => {
            let mut hasher = Shake128::default();
            feed(&mut |bytes| hasher.update(bytes), fields);
            read_xof(hasher, config.hash_size)
        }
        HashAlgorithm::Shake256 => {
            let mut hasher = Shake256::default();
            feed(&mut |bytes| hasher.update(bytes), fields);
            read_xof(hasher, config.hash_size)
        }
    };

    Ok(hex::encode(digest))
}

fn read_xof(hasher: impl ExtendableOutput, size: usize) -> Vec<u8> {
    let mut reader = hasher.finalize_xof();
    let mut out = vec![0u8; size];
    reader.read(&mut out);
    out
}
