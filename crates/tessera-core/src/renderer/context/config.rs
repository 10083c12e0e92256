// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Creation parameters of a rendering context.

use serde::{Deserialize, Serialize};

/// Requested properties of a native context and its default framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Name used in logs and diagnostics.
    pub label: String,
    /// Requested color bits per pixel.
    pub bits_per_pixel: u8,
    /// Requested depth buffer bits.
    pub depth_bits: u8,
    /// Requested stencil buffer bits.
    pub stencil_bits: u8,
    /// Requested multisample count, `0` for none.
    pub antialiasing_level: u8,
    /// Request an sRGB-capable default framebuffer.
    pub srgb_capable: bool,
    /// Whether this context owns its native context. Contexts wrapping a
    /// native context owned by someone else never dispatch lifecycle events.
    pub owns_native: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            label: "context".to_string(),
            bits_per_pixel: 32,
            depth_bits: 24,
            stencil_bits: 8,
            antialiasing_level: 0,
            srgb_capable: false,
            owns_native: true,
        }
    }
}

/// A pixel format offered by the platform when creating a native context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormatCandidate {
    /// Color bits per pixel.
    pub color_bits: u8,
    /// Depth buffer bits.
    pub depth_bits: u8,
    /// Stencil buffer bits.
    pub stencil_bits: u8,
    /// Multisample count.
    pub antialiasing_level: u8,
    /// Hardware accelerated.
    pub accelerated: bool,
    /// sRGB-capable.
    pub srgb_capable: bool,
}

const UNDERSHOOT_WEIGHT: i64 = 100_000;
const MISSING_SRGB_PENALTY: i64 = 10_000_000;
const SOFTWARE_PENALTY: i64 = 100_000_000;

impl ContextConfig {
    /// Creates a config with default buffers and the given label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Scores how well `candidate` matches this config. Lower is better.
    ///
    /// Falling short of a request is weighted far more heavily than
    /// exceeding it, and a software format loses against any accelerated one.
    pub fn evaluate_format(&self, candidate: &PixelFormatCandidate) -> i64 {
        let diff = |requested: u8, offered: u8| {
            let d = requested as i64 - offered as i64;
            if d > 0 {
                d * UNDERSHOOT_WEIGHT
            } else {
                -d
            }
        };

        let mut score = diff(self.bits_per_pixel, candidate.color_bits)
            + diff(self.depth_bits, candidate.depth_bits)
            + diff(self.stencil_bits, candidate.stencil_bits)
            + diff(self.antialiasing_level, candidate.antialiasing_level);

        if self.srgb_capable && !candidate.srgb_capable {
            score += MISSING_SRGB_PENALTY;
        }
        if !candidate.accelerated {
            score += SOFTWARE_PENALTY;
        }
        score
    }

    /// Picks the best-scoring candidate. Ties keep the earliest one.
    pub fn choose_format<'a>(&self, candidates: &'a [PixelFormatCandidate]) -> Option<&'a PixelFormatCandidate> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(index, c)| (self.evaluate_format(c), *index))
            .map(|(_, c)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(depth_bits: u8, accelerated: bool) -> PixelFormatCandidate {
        PixelFormatCandidate {
            color_bits: 32,
            depth_bits,
            stencil_bits: 8,
            antialiasing_level: 0,
            accelerated,
            srgb_capable: false,
        }
    }

    #[test]
    fn test_exact_match_scores_zero() {
        let config = ContextConfig::default();
        assert_eq!(config.evaluate_format(&candidate(24, true)), 0);
    }

    #[test]
    fn test_undershoot_costs_more_than_overshoot() {
        let config = ContextConfig::default();
        let under = config.evaluate_format(&candidate(16, true));
        let over = config.evaluate_format(&candidate(32, true));
        assert_eq!(under, 8 * 100_000);
        assert_eq!(over, 8);
    }

    #[test]
    fn test_choose_prefers_accelerated() {
        let config = ContextConfig::default();
        let candidates = [candidate(24, false), candidate(16, true), candidate(32, true)];
        assert_eq!(config.choose_format(&candidates), Some(&candidates[2]));
    }

    #[test]
    fn test_missing_srgb_penalty() {
        let config = ContextConfig {
            srgb_capable: true,
            ..ContextConfig::default()
        };
        assert_eq!(config.evaluate_format(&candidate(24, true)), 10_000_000);
    }
}
