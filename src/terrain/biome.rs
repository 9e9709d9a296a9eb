//! Biome identity, soft weights and surface tinting.
//!
//! Biomes are selected from a low-frequency noise channel: each biome owns
//! an anchor value in the channel's `[-1, 1]` range and contributes a soft
//! triangular weight around it. Weights are normalized to sum to 1 and the
//! argmax names the dominant biome. The same weights blend the per-biome
//! terrain parameter offsets and the grass surface tint, so biome borders
//! fade instead of stepping.

use serde::{Deserialize, Serialize};

/// The biome set. The weight/blend machinery is sized by `BIOME_COUNT`, so
/// adding a biome means adding an anchor, a tint and an offsets entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BiomeId {
    Desert,
    Plains,
    Mountains,
}

pub const BIOME_COUNT: usize = 3;

impl BiomeId {
    pub const ALL: [BiomeId; BIOME_COUNT] = [BiomeId::Desert, BiomeId::Plains, BiomeId::Mountains];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            BiomeId::Desert => 0,
            BiomeId::Plains => 1,
            BiomeId::Mountains => 2,
        }
    }
}

/// Anchor values in the selector channel, one per biome in `ALL` order.
const BIOME_ANCHORS: [f64; BIOME_COUNT] = [-0.55, 0.0, 0.55];

/// Surface tint per biome in `ALL` order (applied to tintable top faces).
const BIOME_TINTS: [[f32; 4]; BIOME_COUNT] = [
    [0.78, 0.70, 0.42, 1.0], // desert
    [0.38, 0.66, 0.26, 1.0], // plains
    [0.44, 0.56, 0.34, 1.0], // mountains
];

/// Normalized weights over the biome set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BiomeWeights {
    weights: [f32; BIOME_COUNT],
}

impl Default for BiomeWeights {
    fn default() -> Self {
        let mut weights = [0.0; BIOME_COUNT];
        weights[BiomeId::Plains.index()] = 1.0;
        Self { weights }
    }
}

impl BiomeWeights {
    /// Compute soft weights from a selector value in `[-1, 1]`.
    ///
    /// Each biome contributes `max(0, 1 - |value - anchor| / radius)`; the
    /// result is normalized to sum to 1. A selector far from every anchor
    /// falls back to the nearest one so the weights always name a biome.
    ///
    /// # Arguments
    /// * `value` - selector noise value
    /// * `radius` - triangular blend radius around each anchor
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_selector(value: f64, radius: f64) -> Self {
        debug_assert!(radius > 0.0, "biome blend radius must be positive");
        let mut weights = [0.0f32; BIOME_COUNT];
        let mut total = 0.0f32;
        for (i, anchor) in BIOME_ANCHORS.iter().enumerate() {
            let w = (1.0 - (value - anchor).abs() / radius).max(0.0) as f32;
            weights[i] = w;
            total += w;
        }

        if total <= f32::EPSILON {
            // Outside every triangle: snap to the nearest anchor.
            let nearest = BIOME_ANCHORS
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let da = (value - **a).abs();
                    let db = (value - **b).abs();
                    da.partial_cmp(&db).expect("anchor distances are finite")
                })
                .map_or(BiomeId::Plains.index(), |(i, _)| i);
            weights[nearest] = 1.0;
            return Self { weights };
        }

        for w in &mut weights {
            *w /= total;
        }
        Self { weights }
    }

    /// Weights that put everything on a single biome.
    #[must_use]
    pub fn pure(biome: BiomeId) -> Self {
        let mut weights = [0.0; BIOME_COUNT];
        weights[biome.index()] = 1.0;
        Self { weights }
    }

    #[must_use]
    pub fn weight(&self, biome: BiomeId) -> f32 {
        self.weights[biome.index()]
    }

    /// The biome with the largest weight.
    #[must_use]
    pub fn dominant(&self) -> BiomeId {
        let mut best = BiomeId::Plains;
        let mut best_w = f32::MIN;
        for biome in BiomeId::ALL {
            let w = self.weights[biome.index()];
            if w > best_w {
                best = biome;
                best_w = w;
            }
        }
        best
    }

    /// Blend one scalar per biome by the weights.
    #[must_use]
    pub fn blend(&self, values: [f32; BIOME_COUNT]) -> f32 {
        let mut out = 0.0;
        for i in 0..BIOME_COUNT {
            out += self.weights[i] * values[i];
        }
        out
    }

    /// Blended surface tint color for tintable top faces.
    #[must_use]
    pub fn surface_tint(&self) -> [f32; 4] {
        let mut tint = [0.0f32; 4];
        for (i, color) in BIOME_TINTS.iter().enumerate() {
            for (t, c) in tint.iter_mut().zip(color) {
                *t += self.weights[i] * c;
            }
        }
        tint[3] = 1.0;
        tint
    }
}
