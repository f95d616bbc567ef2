//! Elliptic-curve group plumbing.
//!
//! [`EcGroup`] is the seam between the sketch encryption code and the curve
//! arithmetic crates.  It fixes the wire representation of a point: a SEC1
//! compressed encoding of [`COMPRESSED_POINT_BYTES`] bytes.  The identity has
//! no compressed SEC1 form, so it is written as the same number of zero
//! bytes, which keeps ciphertext streams fixed-width; no valid compressed
//! point starts with a zero tag, so the two never collide.

use elliptic_curve::ff::PrimeField;
use elliptic_curve::group::{Curve as _, Group};
use elliptic_curve::sec1::{EncodedPoint, FromEncodedPoint, ToEncodedPoint};
use elliptic_curve::{AffinePoint, CurveArithmetic, FieldBytes, ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of a compressed point on the supported 256-bit curves.
pub const COMPRESSED_POINT_BYTES: usize = 33;

/// Errors raised by the curve, ElGamal and encryption layers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("unsupported curve: {0}")]
    /// The curve name or identifier is not supported.
    UnsupportedCurve(String),
    #[error("invalid public key: {0}")]
    /// The public key bytes do not describe a usable key.
    InvalidPublicKey(String),
    #[error("invalid point: {0}")]
    /// Bytes could not be decoded as a curve point.
    InvalidPoint(String),
    #[error("point encoding failed: {0}")]
    /// A point could not be written in the fixed-width encoding.
    PointEncoding(String),
    #[error("value {value} is outside the scalar field")]
    /// A scalar does not fit the curve's scalar field.
    ScalarOutOfRange {
        /// The rejected value.
        value: u64,
    },
    #[error("POINT_AT_INFINITY: decryption produced the identity element")]
    /// Decryption produced the identity, i.e. the plaintext was zero.
    PointAtInfinity,
    #[error("ciphertext stream of {length} bytes is not a multiple of {width}")]
    /// A ciphertext buffer has the wrong length.
    MalformedCiphertext {
        /// Length of the rejected buffer.
        length: usize,
        /// Width of one ciphertext pair.
        width: usize,
    },
    #[error("decrypted point does not match any value in [1, {max}]")]
    /// Brute-force decoding found no matching value.
    ValueNotFound {
        /// Upper bound of the search.
        max: u64,
    },
    #[error("shard size must be positive")]
    /// Sharded encryption was asked for empty shards.
    InvalidShardSize,
}

/// Supported curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveId {
    /// NIST P-256 (`prime256v1`).
    #[serde(rename = "prime256v1")]
    P256,
    /// SEC2 `secp256k1`.
    #[serde(rename = "secp256k1")]
    Secp256k1,
}

impl CurveId {
    /// OpenSSL numeric identifier of the curve.
    pub fn nid(self) -> i32 {
        match self {
            CurveId::P256 => 415,
            CurveId::Secp256k1 => 714,
        }
    }

    /// Resolves an OpenSSL numeric identifier.
    pub fn from_nid(nid: i32) -> Result<Self, CryptoError> {
        match nid {
            415 => Ok(CurveId::P256),
            714 => Ok(CurveId::Secp256k1),
            other => Err(CryptoError::UnsupportedCurve(format!("nid {other}"))),
        }
    }

    /// Canonical curve name.
    pub fn name(self) -> &'static str {
        match self {
            CurveId::P256 => "prime256v1",
            CurveId::Secp256k1 => "secp256k1",
        }
    }
}

impl fmt::Display for CurveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CurveId {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "prime256v1" | "p256" | "p-256" | "secp256r1" => Ok(CurveId::P256),
            "secp256k1" | "k256" => Ok(CurveId::Secp256k1),
            _ => Err(CryptoError::UnsupportedCurve(name.to_string())),
        }
    }
}

/// A prime-order curve group usable for sketch encryption.
pub trait EcGroup: CurveArithmetic {
    /// Identifier of the curve.
    const CURVE_ID: CurveId;
    /// Serialized width of one point.
    const POINT_SIZE: usize;

    /// Appends the fixed-width encoding of `point` to `buffer`.
    fn serialize_point(point: &ProjectivePoint<Self>, buffer: &mut Vec<u8>)
        -> Result<(), CryptoError>;

    /// Decodes one fixed-width point.
    fn deserialize_point(bytes: &[u8]) -> Result<ProjectivePoint<Self>, CryptoError>;
}

macro_rules! impl_ec_group {
    ($curve:ty, $id:expr) => {
        impl EcGroup for $curve {
            const CURVE_ID: CurveId = $id;
            const POINT_SIZE: usize = COMPRESSED_POINT_BYTES;

            fn serialize_point(
                point: &ProjectivePoint<Self>,
                buffer: &mut Vec<u8>,
            ) -> Result<(), CryptoError> {
                if bool::from(point.is_identity()) {
                    buffer.extend_from_slice(&[0u8; COMPRESSED_POINT_BYTES]);
                    return Ok(());
                }
                let encoded = point.to_affine().to_encoded_point(true);
                let bytes = encoded.as_bytes();
                if bytes.len() != COMPRESSED_POINT_BYTES {
                    return Err(CryptoError::PointEncoding(format!(
                        "expected {COMPRESSED_POINT_BYTES} bytes, got {}",
                        bytes.len()
                    )));
                }
                buffer.extend_from_slice(bytes);
                Ok(())
            }

            fn deserialize_point(bytes: &[u8]) -> Result<ProjectivePoint<Self>, CryptoError> {
                if bytes.len() != COMPRESSED_POINT_BYTES {
                    return Err(CryptoError::InvalidPoint(format!(
                        "expected {COMPRESSED_POINT_BYTES} bytes, got {}",
                        bytes.len()
                    )));
                }
                if bytes.iter().all(|&byte| byte == 0) {
                    return Ok(ProjectivePoint::<Self>::identity());
                }
                let encoded = EncodedPoint::<Self>::from_bytes(bytes)
                    .map_err(|err| CryptoError::InvalidPoint(err.to_string()))?;
                let affine: Option<AffinePoint<Self>> =
                    AffinePoint::<Self>::from_encoded_point(&encoded).into();
                affine
                    .map(ProjectivePoint::<Self>::from)
                    .ok_or_else(|| CryptoError::InvalidPoint("point is not on the curve".into()))
            }
        }
    };
}

impl_ec_group!(k256::Secp256k1, CurveId::Secp256k1);
impl_ec_group!(p256::NistP256, CurveId::P256);

/// Converts `value` into a scalar of `C`.
///
/// Fails if the value does not fit the scalar field.  Every `u64` fits the
/// 256-bit curves shipped here.
pub fn scalar_from_u64<C: EcGroup>(value: u64) -> Result<Scalar<C>, CryptoError> {
    let mut repr = FieldBytes::<C>::default();
    let offset = repr
        .len()
        .checked_sub(8)
        .ok_or(CryptoError::ScalarOutOfRange { value })?;
    repr[offset..].copy_from_slice(&value.to_be_bytes());
    Option::<Scalar<C>>::from(Scalar::<C>::from_repr(repr))
        .ok_or(CryptoError::ScalarOutOfRange { value })
}

/// Maps `value` onto the curve as `value · G`.
///
/// Zero maps to the identity element.
pub fn encode_value<C: EcGroup>(value: u64) -> Result<ProjectivePoint<C>, CryptoError> {
    let scalar = scalar_from_u64::<C>(value)?;
    Ok(ProjectivePoint::<C>::generator() * scalar)
}

/// Recovers `v` from `v · G` by searching `[1, max]`.
///
/// The identity is reported as [`CryptoError::PointAtInfinity`] rather than
/// decoded to zero, so callers handle the empty-count case explicitly.
pub fn decode_value<C: EcGroup>(point: &ProjectivePoint<C>, max: u64) -> Result<u64, CryptoError> {
    if bool::from(point.is_identity()) {
        return Err(CryptoError::PointAtInfinity);
    }
    let generator = ProjectivePoint::<C>::generator();
    let mut candidate = generator;
    for value in 1..=max {
        if candidate == *point {
            return Ok(value);
        }
        candidate = candidate + generator;
    }
    Err(CryptoError::ValueNotFound { max })
}
