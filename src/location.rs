//! Location Module
//!
//! Device position samples and the sources the reporter reads them from.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single location sample in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    /// Sentinel for "no fix yet"
    pub const UNKNOWN: Position = Position { latitude: 0.0, longitude: 0.0 };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Something that knows the device's most recent position.
///
/// `latest` must not block; implementations return what they already hold
/// and fall back to [`Position::UNKNOWN`] when they hold nothing.
pub trait PositionSource: Send + Sync {
    fn latest(&self) -> Position;
}

/// Position slot written by a platform location callback and read by the
/// reporter. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedPosition {
    current: Arc<RwLock<Position>>,
}

impl SharedPosition {
    pub fn new(initial: Position) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
        }
    }

    /// Record a new fix, replacing the previous one
    pub fn update(&self, position: Position) {
        debug!("Position updated: {}", position);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = position;
    }
}

impl PositionSource for SharedPosition {
    fn latest(&self) -> Position {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A source that always reports the same position
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPosition(pub Position);

impl PositionSource for FixedPosition {
    fn latest(&self) -> Position {
        self.0
    }
}
