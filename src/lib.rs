//! Tombola
//!
//! Tombola is a constrained-allocation engine for promotional campaigns:
//! bingo-style discount giveaways, booster missions, loyalty black boxes and
//! raffle ticket issuance. Given a fixed budget, a set of discrete prize
//! tiers and a target participant count, it computes integer quantities per
//! tier that respect the budget, preserve the total count exactly and track
//! the closed-form continuous solution as closely as possible.
//!
//! The engine is a pure computation library: it consumes plain numeric
//! inputs, returns serialisable reports and performs no I/O. The only
//! non-deterministic entry point is the black-box draw simulation, which
//! takes an injectable random source.

pub mod black_box;
pub mod booster;
pub mod discount;
pub mod lot;
pub mod lottery;
pub mod rounding;
