//! Sketch encryption.
//!
//! An encrypter turns a populated [`Sketch`] into one flat ciphertext stream.
//! Registers are walked in store order; each register contributes one
//! ciphertext for its index followed by one per value slot.  Value scalars are
//! clamped to the context's counter ceiling before encoding so that
//! aggregated sums stay within the range the decrypting party can search.
//! Indices are identifiers and are never clamped.
//!
//! Every scalar is blinded with fresh randomness: encrypting the same
//! sketch twice never yields the same bytes.

use rand_core::{CryptoRngCore, OsRng};
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use crate::curve::{encode_value, CryptoError, CurveId, EcGroup};
use crate::elgamal::{Ciphertext, EncodedPublicKey, PublicKey};
use crate::sketch::{Register, Sketch};

/// Encrypts sketches into ciphertext streams.
pub trait SketchEncrypter {
    /// Curve the ciphertexts live on.
    fn curve_id(&self) -> CurveId;

    /// Encrypts every register of `sketch`.
    ///
    /// The output holds `registers * (1 + slots)` ciphertext pairs.
    fn encrypt(&mut self, sketch: &Sketch) -> Result<Vec<u8>, CryptoError>;
}

/// Immutable parameters shared by encrypters of one protocol run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptionContext<C: EcGroup> {
    public_key: PublicKey<C>,
    max_counter_value: u64,
}

impl<C: EcGroup> EncryptionContext<C> {
    /// Builds a context from a decoded key.
    pub fn new(public_key: PublicKey<C>, max_counter_value: u64) -> Self {
        Self {
            public_key,
            max_counter_value,
        }
    }

    /// Decodes `public_key` and builds a context.
    pub fn from_encoded(
        public_key: &EncodedPublicKey,
        max_counter_value: u64,
    ) -> Result<Self, CryptoError> {
        Ok(Self::new(PublicKey::from_encoded(public_key)?, max_counter_value))
    }

    /// Public key ciphertexts are encrypted under.
    pub fn public_key(&self) -> &PublicKey<C> {
        &self.public_key
    }

    /// Ceiling applied to every value scalar.
    pub fn max_counter_value(&self) -> u64 {
        self.max_counter_value
    }
}

/// ElGamal sketch encrypter over curve `C`, drawing blinding factors from `R`.
#[derive(Debug)]
pub struct EcSketchEncrypter<C: EcGroup, R = OsRng> {
    context: EncryptionContext<C>,
    rng: R,
}

impl<C: EcGroup> EcSketchEncrypter<C, OsRng> {
    /// Creates an encrypter from encoded public key bytes.
    pub fn new(max_counter_value: u64, public_key: &EncodedPublicKey) -> Result<Self, CryptoError> {
        let context = EncryptionContext::from_encoded(public_key, max_counter_value)?;
        tracing::debug!(curve = %C::CURVE_ID, max_counter_value, "sketch encrypter ready");
        Ok(Self::from_context(context))
    }

    /// Creates an encrypter that blinds with operating-system randomness.
    pub fn from_context(context: EncryptionContext<C>) -> Self {
        Self::with_rng(context, OsRng)
    }
}

impl<C: EcGroup, R: CryptoRngCore> EcSketchEncrypter<C, R> {
    /// Creates an encrypter with a caller-supplied randomness source.
    pub fn with_rng(context: EncryptionContext<C>, rng: R) -> Self {
        Self { context, rng }
    }

    /// Parameters this encrypter was built with.
    pub fn context(&self) -> &EncryptionContext<C> {
        &self.context
    }

    fn encrypt_registers(
        &mut self,
        registers: &[Register],
        slot_count: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut out =
            Vec::with_capacity(registers.len() * (1 + slot_count) * Ciphertext::<C>::BYTES);
        for register in registers {
            self.encrypt_scalar(register.index, &mut out)?;
            for &value in &register.values {
                let clamped = value.min(self.context.max_counter_value);
                self.encrypt_scalar(clamped, &mut out)?;
            }
        }
        Ok(out)
    }

    fn encrypt_scalar(&mut self, value: u64, out: &mut Vec<u8>) -> Result<(), CryptoError> {
        let message = encode_value::<C>(value)?;
        let ciphertext = self.context.public_key.encrypt_point(message, &mut self.rng);
        ciphertext.write_to(out)
    }
}

impl<C: EcGroup, R: CryptoRngCore> SketchEncrypter for EcSketchEncrypter<C, R> {
    fn curve_id(&self) -> CurveId {
        C::CURVE_ID
    }

    fn encrypt(&mut self, sketch: &Sketch) -> Result<Vec<u8>, CryptoError> {
        let slots = sketch.config().slot_count();
        let out = self.encrypt_registers(sketch.registers(), slots)?;
        tracing::debug!(
            curve = %C::CURVE_ID,
            registers = sketch.len(),
            slots,
            bytes = out.len(),
            "encrypted sketch"
        );
        Ok(out)
    }
}

/// Builds an encrypter for the curve named by `curve_id`.
pub fn create_with_public_key(
    curve_id: CurveId,
    max_counter_value: u64,
    public_key: &EncodedPublicKey,
) -> Result<Box<dyn SketchEncrypter + Send>, CryptoError> {
    let encrypter: Box<dyn SketchEncrypter + Send> = match curve_id {
        CurveId::P256 => Box::new(EcSketchEncrypter::<p256::NistP256>::new(
            max_counter_value,
            public_key,
        )?),
        CurveId::Secp256k1 => Box::new(EcSketchEncrypter::<k256::Secp256k1>::new(
            max_counter_value,
            public_key,
        )?),
    };
    Ok(encrypter)
}

/// Encrypts `sketch` in shards of `shard_size` registers.
///
/// Each shard gets its own encrypter and randomness source; the shards are
/// concatenated in register order, so the stream layout matches
/// [`SketchEncrypter::encrypt`].
pub fn encrypt_sharded<C: EcGroup>(
    context: &EncryptionContext<C>,
    sketch: &Sketch,
    shard_size: usize,
) -> Result<Vec<u8>, CryptoError> {
    if shard_size == 0 {
        return Err(CryptoError::InvalidShardSize);
    }
    let slots = sketch.config().slot_count();
    let encrypt_shard = |shard: &[Register]| {
        EcSketchEncrypter::from_context(*context).encrypt_registers(shard, slots)
    };

    #[cfg(not(target_arch = "wasm32"))]
    let shards: Vec<Vec<u8>> = sketch
        .registers()
        .par_chunks(shard_size)
        .map(encrypt_shard)
        .collect::<Result<_, _>>()?;
    #[cfg(target_arch = "wasm32")]
    let shards: Vec<Vec<u8>> = sketch
        .registers()
        .chunks(shard_size)
        .map(encrypt_shard)
        .collect::<Result<_, _>>()?;

    tracing::debug!(
        curve = %C::CURVE_ID,
        registers = sketch.len(),
        shards = shards.len(),
        "encrypted sketch in shards"
    );
    Ok(shards.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SketchConfig, ValueSpec};
    use crate::elgamal::{parse_ciphertext_stream, SecretKey};
    use crate::sketch::Register;
    use crate::uprg::UniformPseudorandomGenerator;
    use crate::value_function::Aggregator;
    use rand::Rng;
    use std::sync::Arc;

    type K = k256::Secp256k1;

    const MAX_COUNTER_VALUE: u64 = 100;

    fn sketch_config(unique_count: usize, sum_count: usize) -> Arc<SketchConfig> {
        let mut specs = Vec::new();
        for i in 0..unique_count {
            specs.push(ValueSpec::new(format!("unique{i}"), Aggregator::Unique));
        }
        for i in 0..sum_count {
            specs.push(ValueSpec::new(format!("sum{i}"), Aggregator::Sum));
        }
        Arc::new(SketchConfig::new(specs).unwrap())
    }

    fn random_sketch(config: Arc<SketchConfig>, register_count: usize) -> Sketch {
        let mut rng = rand::thread_rng();
        let slots = config.slot_count();
        let registers = (0..register_count)
            .map(|_| {
                // Some, but not too many, values exceed the ceiling.
                let values = (0..slots)
                    .map(|_| rng.gen_range(0..MAX_COUNTER_VALUE * 2))
                    .collect();
                Register::new(rng.gen(), values)
            })
            .collect();
        Sketch::from_registers(config, registers).unwrap()
    }

    fn fixture() -> (SecretKey<K>, EcSketchEncrypter<K>) {
        let secret = SecretKey::<K>::generate(&mut OsRng);
        let encoded = secret.public_key().to_encoded().unwrap();
        let encrypter = EcSketchEncrypter::<K>::new(MAX_COUNTER_VALUE, &encoded).unwrap();
        (secret, encrypter)
    }

    fn same_decryption(secret: &SecretKey<K>, a: &Ciphertext<K>, b: &Ciphertext<K>) -> bool {
        secret.decrypt(a) == secret.decrypt(b)
    }

    #[test]
    fn test_byte_size() {
        let (_, mut encrypter) = fixture();
        let sketch = random_sketch(sketch_config(2, 3), 1000);
        let out = encrypter.encrypt(&sketch).unwrap();
        assert_eq!(out.len(), 1000 * (1 + 2 + 3) * 66);
    }

    #[test]
    fn test_encryption_is_non_deterministic() {
        let (secret, mut encrypter) = fixture();
        let sketch = Sketch::from_registers(
            sketch_config(0, 0),
            vec![Register::new(1, vec![]), Register::new(1, vec![])],
        )
        .unwrap();
        let out = encrypter.encrypt(&sketch).unwrap();
        let ciphertexts = parse_ciphertext_stream::<K>(&out).unwrap();
        assert_eq!(ciphertexts.len(), 2);
        let (a, b) = (ciphertexts[0], ciphertexts[1]);
        assert_ne!(&out[0..33], &out[66..99]);
        assert_ne!(&out[33..66], &out[99..132]);
        assert!(same_decryption(&secret, &a, &b));
        assert_eq!(secret.decrypt_value(&a, 10), Ok(1));
    }

    #[test]
    fn test_count_values_are_additive_homomorphic() {
        let (secret, mut encrypter) = fixture();
        let mut sketch = Sketch::new(sketch_config(0, 1));
        for value in 1..=5u64 {
            sketch.insert(value * 10, &[value]).unwrap();
        }
        let out = encrypter.encrypt(&sketch).unwrap();
        let ciphertexts = parse_ciphertext_stream::<K>(&out).unwrap();
        assert_eq!(ciphertexts.len(), 10);
        let count = |n: usize| ciphertexts[2 * (n - 1) + 1];
        assert!(same_decryption(&secret, &count(5), &(count(1) + count(4))));
        assert!(same_decryption(&secret, &count(5), &(count(2) + count(3))));
        assert_eq!(secret.decrypt_value(&(count(2) + count(3)), MAX_COUNTER_VALUE), Ok(5));
    }

    #[test]
    fn test_values_above_ceiling_are_clamped() {
        let (secret, mut encrypter) = fixture();
        let mut sketch = Sketch::new(sketch_config(0, 1));
        sketch.insert(1, &[MAX_COUNTER_VALUE + 10]).unwrap();
        sketch.insert(2, &[MAX_COUNTER_VALUE]).unwrap();
        sketch.insert(3, &[u64::MAX]).unwrap();
        let out = encrypter.encrypt(&sketch).unwrap();
        let ciphertexts = parse_ciphertext_stream::<K>(&out).unwrap();
        assert_eq!(ciphertexts.len(), 6);
        assert!(same_decryption(&secret, &ciphertexts[1], &ciphertexts[3]));
        assert!(same_decryption(&secret, &ciphertexts[5], &ciphertexts[3]));
        assert_eq!(
            secret.decrypt_value(&ciphertexts[1], MAX_COUNTER_VALUE),
            Ok(MAX_COUNTER_VALUE)
        );
    }

    #[test]
    fn test_index_is_never_clamped() {
        let (secret, mut encrypter) = fixture();
        let mut sketch = Sketch::new(sketch_config(0, 1));
        sketch.insert(u64::MAX, &[1]).unwrap();
        let out = encrypter.encrypt(&sketch).unwrap();
        let ciphertexts = parse_ciphertext_stream::<K>(&out).unwrap();
        assert_eq!(
            secret.decrypt(&ciphertexts[0]),
            Ok(encode_value::<K>(u64::MAX).unwrap())
        );
    }

    #[test]
    fn test_zero_count_has_valid_encryption() {
        let (secret, mut encrypter) = fixture();
        let mut sketch = Sketch::new(sketch_config(0, 1));
        sketch.insert(7, &[0]).unwrap();
        let out = encrypter.encrypt(&sketch).unwrap();
        assert_eq!(out.len(), 2 * 66);
        let ciphertexts = parse_ciphertext_stream::<K>(&out).unwrap();
        let err = secret.decrypt(&ciphertexts[1]).unwrap_err();
        assert_eq!(err, CryptoError::PointAtInfinity);
        assert!(err.to_string().contains("POINT_AT_INFINITY"));
    }

    #[test]
    fn test_invalid_public_key_rejected() {
        let bad = EncodedPublicKey {
            generator: vec![0x02; 12],
            element: vec![0x02; 33],
        };
        assert!(matches!(
            EcSketchEncrypter::<K>::new(MAX_COUNTER_VALUE, &bad),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn test_create_with_public_key_dispatches_on_curve() {
        let secret = SecretKey::<p256::NistP256>::generate(&mut OsRng);
        let encoded = secret.public_key().to_encoded().unwrap();
        let mut encrypter =
            create_with_public_key(CurveId::P256, MAX_COUNTER_VALUE, &encoded).unwrap();
        assert_eq!(encrypter.curve_id(), CurveId::P256);
        let mut sketch = Sketch::new(sketch_config(1, 1));
        sketch.insert(3, &[4, 5]).unwrap();
        let out = encrypter.encrypt(&sketch).unwrap();
        let ciphertexts = parse_ciphertext_stream::<p256::NistP256>(&out).unwrap();
        assert_eq!(secret.decrypt_value(&ciphertexts[2], MAX_COUNTER_VALUE), Ok(5));
    }

    #[test]
    fn test_seeded_encrypter_is_reproducible() {
        let secret = SecretKey::<K>::generate(&mut OsRng);
        let context = EncryptionContext::new(*secret.public_key(), MAX_COUNTER_VALUE);
        let sketch = random_sketch(sketch_config(1, 2), 20);
        let mut a = EcSketchEncrypter::with_rng(
            context,
            UniformPseudorandomGenerator::from_seed(b"fixture"),
        );
        let mut b = EcSketchEncrypter::with_rng(
            context,
            UniformPseudorandomGenerator::from_seed(b"fixture"),
        );
        assert_eq!(a.encrypt(&sketch).unwrap(), b.encrypt(&sketch).unwrap());
    }

    #[test]
    fn test_sharded_encryption_matches_layout() {
        let secret = SecretKey::<K>::generate(&mut OsRng);
        let context = EncryptionContext::new(*secret.public_key(), MAX_COUNTER_VALUE);
        let mut sketch = Sketch::new(sketch_config(0, 1));
        for index in 1..=9u64 {
            sketch.insert(index, &[index + 1]).unwrap();
        }
        let out = encrypt_sharded(&context, &sketch, 4).unwrap();
        assert_eq!(out.len(), 9 * 2 * 66);
        let ciphertexts = parse_ciphertext_stream::<K>(&out).unwrap();
        for (i, register) in sketch.registers().iter().enumerate() {
            assert_eq!(
                secret.decrypt_value(&ciphertexts[2 * i], 20),
                Ok(register.index)
            );
            assert_eq!(
                secret.decrypt_value(&ciphertexts[2 * i + 1], 20),
                Ok(register.values[0])
            );
        }
        assert_eq!(
            encrypt_sharded(&context, &sketch, 0),
            Err(CryptoError::InvalidShardSize)
        );
    }

    #[test]
    fn test_empty_sketch_encrypts_to_nothing() {
        let (_, mut encrypter) = fixture();
        let sketch = Sketch::new(sketch_config(1, 1));
        assert!(encrypter.encrypt(&sketch).unwrap().is_empty());
    }
}
