use crate::result::Error;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// A 256-bit seed for the obfuscation pipeline
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    /// The 256-bit seed
    inner: [u8; 32],
}

impl Seed {
    /// Generate a new random 256-bit seed
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Self { inner: seed }
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.len() != 64 {
            return Err(Error::InvalidSeedLength(hex.len()));
        }

        let bytes = hex::decode(hex).map_err(|_| Error::InvalidSeedHex)?;
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes);
        Ok(Self { inner: seed })
    }

    /// Derive a seed from an arbitrary user-supplied phrase.
    ///
    /// Any string is accepted; the phrase is hashed so short or low-entropy
    /// inputs still spread over the full 256-bit space.
    pub fn from_phrase(phrase: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(b"GORON_SEED_PHRASE");
        hasher.update(phrase.as_bytes());
        Self {
            inner: hasher.finalize().into(),
        }
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.inner))
    }

    /// Get a hash of this seed for integrity/identification purposes
    pub fn hash(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(self.inner);
        hasher.finalize().into()
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the raw seed; the hash identifies it well enough
        write!(f, "Seed({})", hex::encode(&self.hash()[..8]))
    }
}

/// Deterministic random source shared by all passes of one module pipeline.
///
/// The same seed always produces the same stream, so a fixed seed on a fixed
/// input module yields byte-identical obfuscated output.
pub struct Prng {
    rng: StdRng,
}

impl Prng {
    /// Create the pipeline RNG from a seed.
    pub fn from_seed(seed: &Seed) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(b"GORON_OBFUSCATION_PRNG");
        hasher.update(seed.to_hex().as_bytes());
        let digest = hasher.finalize();

        let mut seed_bytes = [0u8; 32];
        seed_bytes.copy_from_slice(&digest);
        Self {
            rng: StdRng::from_seed(seed_bytes),
        }
    }

    /// Next uniform 32-bit word.
    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Fill `buf` with random bytes.
    pub fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(&mut buf[..]);
    }

    /// A random byte vector whose length is `min + (u32 % (max - min))`.
    ///
    /// Matches the key/junk sizing used by the string pool: for `min` 16 and
    /// `max` 32 the result length lies in [16, 31].
    pub fn bytes_in_range(&mut self, min: u32, max: u32) -> Vec<u8> {
        debug_assert!(max >= min);
        let len = if min == max {
            min
        } else {
            min + self.next_u32() % (max - min)
        };
        let mut buf = vec![0u8; len as usize];
        self.fill_bytes(&mut buf);
        buf
    }

    /// Fork a child RNG from this stream, for consumers that need their own
    /// engine (e.g. shuffles) without disturbing the shared sequence more
    /// than one draw.
    pub fn fork(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.next_u32() as u64)
    }
}
