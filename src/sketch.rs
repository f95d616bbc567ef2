//! In-memory sketch store.
//!
//! A [`Sketch`] holds registers keyed by index.  Inserting into an index that
//! already exists merges slot by slot with the config's value functions, so
//! colliding contributions are resolved at insertion time.  Registers are kept
//! in order of first appearance; the encrypter relies on that order only for
//! positional mapping of the ciphertext stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SketchConfig;
use crate::value_function::ValueFunction;

/// Errors raised while building configs and sketches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SketchError {
    #[error("unknown aggregator: {0}")]
    /// The aggregator name is not a known merge policy.
    UnknownAggregator(String),
    #[error("duplicate value slot: {0}")]
    /// Two slots share a name.
    DuplicateSlot(String),
    #[error("register {index} has {actual} values but the config defines {expected} slots")]
    /// A register does not carry one value per configured slot.
    ValueCountMismatch {
        /// Index of the offending register.
        index: u64,
        /// Slot count of the config.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
    #[error("sketches with different configs cannot be merged")]
    /// Merge attempted across incompatible configs.
    ConfigMismatch,
    #[error("io error: {0}")]
    /// Underlying filesystem failure.
    Io(String),
    #[error("decode error: {0}")]
    /// Config text could not be parsed.
    Decode(String),
}

/// A single sketch bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register {
    /// Register identifier chosen by the distribution policy.
    pub index: u64,
    /// One value per configured slot.
    pub values: Vec<u64>,
}

impl Register {
    /// Builds a register.
    pub fn new(index: u64, values: Vec<u64>) -> Self {
        Self { index, values }
    }
}

/// Ordered collection of registers sharing one config.
#[derive(Debug, Clone)]
pub struct Sketch {
    config: Arc<SketchConfig>,
    registers: Vec<Register>,
    positions: HashMap<u64, usize>,
}

impl Sketch {
    /// Creates an empty sketch.
    pub fn new(config: Arc<SketchConfig>) -> Self {
        Self {
            config,
            registers: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Wraps registers produced elsewhere, without merging duplicates.
    ///
    /// Registers that share an index are kept side by side.  Later calls to
    /// [`insert`](Self::insert) merge into the first register with that index.
    pub fn from_registers(
        config: Arc<SketchConfig>,
        registers: Vec<Register>,
    ) -> Result<Self, SketchError> {
        let mut positions = HashMap::with_capacity(registers.len());
        for (pos, register) in registers.iter().enumerate() {
            check_value_count(&config, register.index, register.values.len())?;
            positions.entry(register.index).or_insert(pos);
        }
        Ok(Self {
            config,
            registers,
            positions,
        })
    }

    /// Config shared by every register.
    pub fn config(&self) -> &Arc<SketchConfig> {
        &self.config
    }

    /// Registers in order of first appearance.
    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    /// Number of registers held.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Returns `true` when no register has been inserted.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Looks up the register stored for `index`.
    pub fn get(&self, index: u64) -> Option<&Register> {
        self.positions.get(&index).map(|&pos| &self.registers[pos])
    }

    /// Inserts a contribution, merging with any register at the same index.
    ///
    /// Fails without touching the sketch when `values` does not have one
    /// entry per configured slot.
    pub fn insert(&mut self, index: u64, values: &[u64]) -> Result<(), SketchError> {
        check_value_count(&self.config, index, values.len())?;
        match self.positions.get(&index).copied() {
            Some(pos) => {
                let register = &mut self.registers[pos];
                for (slot, (function, &incoming)) in
                    self.config.value_functions().zip(values).enumerate()
                {
                    let old = register.values[slot];
                    let merged = function.combine(old, incoming);
                    if let ValueFunction::Unique { collision } = function {
                        if merged == collision && old != collision {
                            tracing::trace!(index, slot, "unique slot collision");
                        }
                    }
                    register.values[slot] = merged;
                }
            }
            None => {
                let initial = self
                    .config
                    .value_functions()
                    .zip(values)
                    .map(|(function, &first)| function.initial(first))
                    .collect();
                self.positions.insert(index, self.registers.len());
                self.registers.push(Register::new(index, initial));
            }
        }
        Ok(())
    }

    /// Folds every register of `other` into this sketch.
    pub fn merge(&mut self, other: &Sketch) -> Result<(), SketchError> {
        if self.config != other.config {
            return Err(SketchError::ConfigMismatch);
        }
        tracing::trace!(
            incoming = other.len(),
            existing = self.len(),
            "merging sketches"
        );
        for register in &other.registers {
            self.insert(register.index, &register.values)?;
        }
        Ok(())
    }
}

fn check_value_count(config: &SketchConfig, index: u64, actual: usize) -> Result<(), SketchError> {
    let expected = config.slot_count();
    if actual != expected {
        return Err(SketchError::ValueCountMismatch {
            index,
            expected,
            actual,
        });
    }
    Ok(())
}
