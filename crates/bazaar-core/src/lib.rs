#![deny(missing_docs)]

//! # bazaar-core — Foundational Types for the Bazaar Settlement Engine
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies. External ones are `serde`,
//! `thiserror`, `chrono`, `hex` and `parking_lot`.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** An [`ExchangeId`] cannot be
//!    passed where an [`OfferId`] is expected, and an [`AssetId`] is not an
//!    account [`Address`].
//!
//! 2. **Validated at construction.** [`Address`] parsing and [`BasisPoints`]
//!    bounds are checked once, when the value is built. Downstream code never
//!    re-validates.
//!
//! 3. **Time is injected.** Every deadline comparison in the engine reads
//!    the current time from a [`Clock`], so tests can cross deadlines
//!    deterministically with [`ManualClock`].
//!
//! 4. **[`ValidationError`]** is a structured `thiserror` enum. No
//!    `Box<dyn Error>` and no `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod percent;
pub mod region;
pub mod temporal;

// Re-export primary types at crate root for ergonomic imports.
pub use error::ValidationError;
pub use identity::{Address, AssetId, ExchangeId, OfferId};
pub use percent::BasisPoints;
pub use region::PausableRegion;
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
