//! Collision-free file names for fragments and documents.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Builder;

/// Produces `<timestamp_ms>_<uuid><suffix>` names.
///
/// The UUID bytes come from the namer's own generator, so a seeded namer yields
/// a reproducible id sequence while the v4 id keeps names unique.
pub struct FileNamer {
    rng: StdRng,
}

impl FileNamer {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_id(&mut self) -> String {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        Builder::from_random_bytes(bytes)
            .into_uuid()
            .simple()
            .to_string()
    }

    pub fn next_name(&mut self, suffix: &str) -> String {
        format!("{}_{}{}", timestamp_millis(), self.next_id(), suffix)
    }
}

impl Default for FileNamer {
    fn default() -> Self {
        Self::from_entropy()
    }
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
