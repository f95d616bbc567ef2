//! Additively homomorphic ElGamal over an [`EcGroup`].
//!
//! A public key is a pair of points `(g, y = x·g)`.  A point `M` encrypts to
//! `(u, e) = (r·g, M + r·y)` for a fresh nonzero `r`, and decrypts as
//! `e - x·u`.  Adding two ciphertexts component-wise encrypts the sum of the
//! two points, which is what lets aggregators sum counts they cannot read.

use elliptic_curve::group::Group;
use elliptic_curve::{NonZeroScalar, ProjectivePoint};
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use std::{fmt, ops};

use crate::curve::{decode_value, CryptoError, EcGroup};

/// One encrypted scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ciphertext<C: EcGroup> {
    /// Randomness component `r·g`.
    pub u: ProjectivePoint<C>,
    /// Blinded message `M + r·y`.
    pub e: ProjectivePoint<C>,
}

impl<C: EcGroup> Ciphertext<C> {
    /// Width of a serialized ciphertext.
    pub const BYTES: usize = 2 * C::POINT_SIZE;

    /// Appends `u || e` to `buffer`.
    pub fn write_to(&self, buffer: &mut Vec<u8>) -> Result<(), CryptoError> {
        C::serialize_point(&self.u, buffer)?;
        C::serialize_point(&self.e, buffer)
    }

    /// Serializes the ciphertext as two fixed-width points.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CryptoError> {
        let mut bytes = Vec::with_capacity(Self::BYTES);
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    /// Parses a ciphertext written by [`to_bytes`](Self::to_bytes).
    ///
    /// `u = r·g` is never the identity for a nonzero `r`, so an identity `u`
    /// is rejected as corrupt.  An identity `e` is a valid encryption.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != Self::BYTES {
            return Err(CryptoError::MalformedCiphertext {
                length: bytes.len(),
                width: Self::BYTES,
            });
        }
        let (u, e) = bytes.split_at(C::POINT_SIZE);
        let u = C::deserialize_point(u)?;
        if bool::from(u.is_identity()) {
            return Err(CryptoError::InvalidPoint(
                "ciphertext randomness component is the identity".into(),
            ));
        }
        Ok(Self {
            u,
            e: C::deserialize_point(e)?,
        })
    }
}

impl<C: EcGroup> ops::Add for Ciphertext<C> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            u: self.u + rhs.u,
            e: self.e + rhs.e,
        }
    }
}

impl<C: EcGroup> ops::AddAssign for Ciphertext<C> {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Splits a ciphertext stream into its pairs.
pub fn parse_ciphertext_stream<C: EcGroup>(bytes: &[u8]) -> Result<Vec<Ciphertext<C>>, CryptoError> {
    let width = Ciphertext::<C>::BYTES;
    if bytes.len() % width != 0 {
        return Err(CryptoError::MalformedCiphertext {
            length: bytes.len(),
            width,
        });
    }
    bytes
        .chunks_exact(width)
        .map(Ciphertext::<C>::from_bytes)
        .collect()
}

/// Public key bytes as exchanged between parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPublicKey {
    /// Compressed generator `g`.
    #[serde(with = "hex_bytes")]
    pub generator: Vec<u8>,
    /// Compressed key element `y = x·g`.
    #[serde(with = "hex_bytes")]
    pub element: Vec<u8>,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// Decoded ElGamal public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey<C: EcGroup> {
    generator: ProjectivePoint<C>,
    element: ProjectivePoint<C>,
}

impl<C: EcGroup> PublicKey<C> {
    /// Decodes and validates a public key.
    ///
    /// Both points must decode on `C` and neither may be the identity.
    pub fn from_encoded(encoded: &EncodedPublicKey) -> Result<Self, CryptoError> {
        let generator = C::deserialize_point(&encoded.generator)
            .map_err(|err| CryptoError::InvalidPublicKey(format!("generator: {err}")))?;
        let element = C::deserialize_point(&encoded.element)
            .map_err(|err| CryptoError::InvalidPublicKey(format!("element: {err}")))?;
        if bool::from(generator.is_identity()) || bool::from(element.is_identity()) {
            return Err(CryptoError::InvalidPublicKey(
                "key points must not be the identity".into(),
            ));
        }
        Ok(Self { generator, element })
    }

    /// Encodes the key for transport.
    pub fn to_encoded(&self) -> Result<EncodedPublicKey, CryptoError> {
        let mut generator = Vec::with_capacity(C::POINT_SIZE);
        C::serialize_point(&self.generator, &mut generator)?;
        let mut element = Vec::with_capacity(C::POINT_SIZE);
        C::serialize_point(&self.element, &mut element)?;
        Ok(EncodedPublicKey { generator, element })
    }

    /// Encrypts `message` with randomness drawn from `rng`.
    pub fn encrypt_point<R: CryptoRngCore>(
        &self,
        message: ProjectivePoint<C>,
        rng: &mut R,
    ) -> Ciphertext<C> {
        let blinding = NonZeroScalar::<C>::random(rng);
        Ciphertext {
            u: self.generator * *blinding,
            e: message + self.element * *blinding,
        }
    }
}

/// Private half of an ElGamal key pair, held by the decrypting party.
#[derive(Clone)]
pub struct SecretKey<C: EcGroup> {
    scalar: NonZeroScalar<C>,
    public: PublicKey<C>,
}

impl<C: EcGroup> fmt::Debug for SecretKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl<C: EcGroup> SecretKey<C> {
    /// Generates a key pair over the curve's canonical generator.
    pub fn generate<R: CryptoRngCore>(rng: &mut R) -> Self {
        let scalar = NonZeroScalar::<C>::random(rng);
        let generator = ProjectivePoint::<C>::generator();
        let public = PublicKey {
            generator,
            element: generator * *scalar,
        };
        Self { scalar, public }
    }

    /// Public key matching this secret.
    pub fn public_key(&self) -> &PublicKey<C> {
        &self.public
    }

    /// Recovers the encrypted point.
    ///
    /// A plaintext of zero decrypts to the identity, which is reported as
    /// [`CryptoError::PointAtInfinity`].
    pub fn decrypt(&self, ciphertext: &Ciphertext<C>) -> Result<ProjectivePoint<C>, CryptoError> {
        let message = ciphertext.e - ciphertext.u * *self.scalar;
        if bool::from(message.is_identity()) {
            return Err(CryptoError::PointAtInfinity);
        }
        Ok(message)
    }

    /// Decrypts and recovers the scalar, searching `[1, max]`.
    pub fn decrypt_value(&self, ciphertext: &Ciphertext<C>, max: u64) -> Result<u64, CryptoError> {
        let message = self.decrypt(ciphertext)?;
        decode_value::<C>(&message, max)
    }
}
