//! Probabilistic datagram loss for stress testing.
//!
//! One [`LossSimulator`] sits on each direction of a session: inbound
//! datagrams are filtered before they reach the engine, outbound segments
//! before they reach the socket. A dropped datagram simply vanishes; the
//! engine's retransmission is what the benchmark is meant to observe.
//!
//! Damage flips one byte of a surviving datagram, which exercises the engine's
//! handling of malformed input.

use std::borrow::Cow;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::core::ConfigError;
use crate::core::constants::RATIO_SCALE;

/// Loss simulation settings. All ratios are percentages in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LossConfig {
    /// Chance, in percent, that a datagram is dropped.
    pub loss_ratio: u32,
    /// Chance, in percent, that a surviving datagram has one byte flipped.
    pub damage_ratio: u32,
    /// RNG seed for reproducible runs. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl LossConfig {
    /// A configuration that never drops or damages anything.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Drop `loss_ratio` percent of datagrams.
    pub fn with_loss(loss_ratio: u32) -> Self {
        Self {
            loss_ratio,
            ..Self::default()
        }
    }

    /// Whether this configuration has any effect.
    pub fn is_passthrough(&self) -> bool {
        self.loss_ratio == 0 && self.damage_ratio == 0
    }

    /// Check ratio bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_ratio", self.loss_ratio),
            ("damage_ratio", self.damage_ratio),
        ] {
            if value > RATIO_SCALE {
                return Err(ConfigError::RatioOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// Which side of the session a simulator filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Datagrams read from the socket.
    Inbound,
    /// Segments produced by the engine.
    Outbound,
}

impl Direction {
    fn seed_offset(self) -> u64 {
        match self {
            Self::Inbound => 0,
            Self::Outbound => 1,
        }
    }
}

/// Drops and damages datagrams according to a [`LossConfig`].
#[derive(Debug, Clone)]
pub struct LossSimulator {
    config: LossConfig,
    direction: Direction,
    rng: StdRng,
    dropped: u64,
    damaged: u64,
}

impl LossSimulator {
    /// Create a simulator for one direction.
    ///
    /// With a seed, each direction derives its own stream so that inbound and
    /// outbound draws are independent.
    pub fn new(config: LossConfig, direction: Direction) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(direction.seed_offset())),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            direction,
            rng,
            dropped: 0,
            damaged: 0,
        }
    }

    /// A simulator that lets everything through.
    pub fn passthrough(direction: Direction) -> Self {
        Self::new(LossConfig::passthrough(), direction)
    }

    /// Filter one datagram.
    ///
    /// Returns `None` if it was dropped, otherwise the (possibly damaged)
    /// bytes to deliver.
    pub fn process<'a>(&mut self, datagram: &'a [u8]) -> Option<Cow<'a, [u8]>> {
        if self.config.is_passthrough() {
            return Some(Cow::Borrowed(datagram));
        }

        if self.should_drop() {
            debug!(direction = ?self.direction, len = datagram.len(), "simulated datagram loss");
            return None;
        }

        if !datagram.is_empty() && self.draw_below(self.config.damage_ratio) {
            let mut damaged = datagram.to_vec();
            let index = self.rng.gen_range(0..damaged.len());
            damaged[index] ^= 0xff;
            self.damaged += 1;
            debug!(direction = ?self.direction, index, "simulated datagram damage");
            return Some(Cow::Owned(damaged));
        }

        Some(Cow::Borrowed(datagram))
    }

    /// Draw once against the loss ratio.
    pub fn should_drop(&mut self) -> bool {
        let drop = self.draw_below(self.config.loss_ratio);
        if drop {
            self.dropped += 1;
        }
        drop
    }

    /// Datagrams dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Datagrams damaged so far.
    pub fn damaged(&self) -> u64 {
        self.damaged
    }

    /// The active configuration.
    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    fn draw_below(&mut self, ratio: u32) -> bool {
        if ratio == 0 {
            return false;
        }
        self.rng.gen_range(0..RATIO_SCALE) < ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(loss_ratio: u32, damage_ratio: u32) -> LossConfig {
        LossConfig {
            loss_ratio,
            damage_ratio,
            seed: Some(42),
        }
    }

    #[test]
    fn test_passthrough_never_drops() {
        let mut sim = LossSimulator::passthrough(Direction::Inbound);
        for _ in 0..1000 {
            assert!(matches!(sim.process(b"data"), Some(Cow::Borrowed(_))));
        }
        assert_eq!(sim.dropped(), 0);
    }

    #[test]
    fn test_full_loss_drops_everything() {
        let mut sim = LossSimulator::new(seeded(100, 0), Direction::Outbound);
        for _ in 0..100 {
            assert!(sim.process(b"data").is_none());
        }
        assert_eq!(sim.dropped(), 100);
    }

    #[test]
    fn test_partial_loss_rate() {
        let mut sim = LossSimulator::new(seeded(30, 0), Direction::Inbound);
        let delivered = (0..10_000).filter(|_| sim.process(b"x").is_some()).count();

        // 70% expected, allow generous slack for the RNG
        assert!((6_500..7_500).contains(&delivered), "delivered {delivered}");
        assert_eq!(sim.dropped(), 10_000 - delivered as u64);
    }

    #[test]
    fn test_damage_flips_one_byte() {
        let mut sim = LossSimulator::new(seeded(0, 100), Direction::Inbound);
        let original = [0u8; 8];
        let damaged = sim.process(&original).unwrap();

        assert!(matches!(damaged, Cow::Owned(_)));
        let flipped = damaged.iter().filter(|&&b| b == 0xff).count();
        assert_eq!(flipped, 1);
        assert_eq!(sim.damaged(), 1);
    }

    #[test]
    fn test_directions_are_independent() {
        let config = seeded(50, 0);
        let mut inbound = LossSimulator::new(config, Direction::Inbound);
        let mut outbound = LossSimulator::new(config, Direction::Outbound);

        let a: Vec<bool> = (0..64).map(|_| inbound.should_drop()).collect();
        let b: Vec<bool> = (0..64).map(|_| outbound.should_drop()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut first = LossSimulator::new(seeded(50, 0), Direction::Inbound);
        let mut second = LossSimulator::new(seeded(50, 0), Direction::Inbound);

        for _ in 0..64 {
            assert_eq!(first.should_drop(), second.should_drop());
        }
    }

    #[test]
    fn test_validate_ratio_bounds() {
        assert!(LossConfig::with_loss(100).validate().is_ok());
        assert_eq!(
            LossConfig::with_loss(101).validate(),
            Err(ConfigError::RatioOutOfRange {
                name: "loss_ratio",
                value: 101
            })
        );
    }
}
