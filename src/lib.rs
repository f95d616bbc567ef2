#![deny(missing_docs)]

//! # sketch_crypt
//!
//! **sketch_crypt** builds mergeable cardinality/frequency sketches and turns
//! them into additively homomorphic ElGamal ciphertext streams.  Independent
//! parties can add each other's encrypted registers point by point without
//! ever seeing a plaintext count; only the holder of the secret key can read
//! the aggregated result.
//!
//! ## Features
//!
//! * **Sketch store**: the [`Sketch`] type collects registers keyed by index
//!   and merges colliding contributions slot by slot with the
//!   [`ValueFunction`] named in its [`SketchConfig`] (`"sum"` or `"unique"`).
//! * **Sketch encryption**: the [`encrypter`](encrypter/index.html) module
//!   encodes every index and value as `v·G`, encrypts it under an ElGamal
//!   public key with fresh randomness, and emits fixed-width 66-byte
//!   ciphertext pairs.  Values are clamped to a counter ceiling so that
//!   aggregated sums stay decryptable.
//! * **Curves**: secp256k1 and NIST P-256 through the [`EcGroup`] trait.
//! * **Uniform pseudorandom generator**: [`UniformPseudorandomGenerator`]
//!   is an AES-256-CTR keystream for reproducible randomness such as test
//!   fixtures.  It is not used for encryption blinding, which draws from the
//!   operating system by default.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use rand_core::OsRng;
//! use sketch_crypt::{
//!     parse_ciphertext_stream, Aggregator, EcSketchEncrypter, SecretKey, Sketch,
//!     SketchConfig, SketchEncrypter, ValueSpec,
//! };
//!
//! let config = SketchConfig::new(vec![ValueSpec::new("frequency", Aggregator::Sum)]).unwrap();
//! let mut sketch = Sketch::new(Arc::new(config));
//! sketch.insert(17, &[2]).unwrap();
//! sketch.insert(17, &[3]).unwrap();
//!
//! // The decrypting party publishes its key.
//! let secret = SecretKey::<k256::Secp256k1>::generate(&mut OsRng);
//! let public = secret.public_key().to_encoded().unwrap();
//!
//! let mut encrypter = EcSketchEncrypter::<k256::Secp256k1>::new(10, &public).unwrap();
//! let stream = encrypter.encrypt(&sketch).unwrap();
//! assert_eq!(stream.len(), 2 * 66);
//!
//! let ciphertexts = parse_ciphertext_stream::<k256::Secp256k1>(&stream).unwrap();
//! assert_eq!(secret.decrypt_value(&ciphertexts[1], 10).unwrap(), 5);
//! ```

mod config;
pub mod curve;
pub mod elgamal;
pub mod encrypter;
mod sketch;
mod uprg;
mod value_function;

pub use config::{SketchConfig, ValueSpec};
pub use curve::{
    decode_value, encode_value, scalar_from_u64, CryptoError, CurveId, EcGroup,
    COMPRESSED_POINT_BYTES,
};
pub use elgamal::{parse_ciphertext_stream, Ciphertext, EncodedPublicKey, PublicKey, SecretKey};
pub use encrypter::{
    create_with_public_key, encrypt_sharded, EcSketchEncrypter, EncryptionContext,
    SketchEncrypter,
};
pub use sketch::{Register, Sketch, SketchError};
pub use uprg::{GeneratorError, UniformPseudorandomGenerator, KEY_BYTES, NONCE_BYTES};
pub use value_function::{Aggregator, ValueFunction, DEFAULT_UNIQUE_COLLISION};
