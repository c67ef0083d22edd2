//! Pattern detectors
//!
//! # Detectors
//!
//! - **Spring**: shakeout below Creek, gated by penetration, volume and recovery.
//! - **Test**: low-volume retest after a Spring, mandatory for any signal.
//! - **Sign of Strength**: high-volume close above Ice, with optional Last
//!   Point of Support retest.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod sos;
pub mod spring;
pub mod test_confirmation;

pub use helpers::*;
pub use sos::*;
pub use spring::*;
pub use test_confirmation::*;
