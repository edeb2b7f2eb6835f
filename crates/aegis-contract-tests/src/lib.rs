//! A compliance suite for implementations of the AegisTrader ports.
//!
//! Every test in here drives `aegis-core`'s public traits end to end
//! through the in-memory `test_stubs` substrate — no running NATS
//! required. That makes it cheap to run on every commit, but it also
//! means anything that only a real JetStream deployment enforces
//! (actual redelivery timing, consumer ack-wait, cross-process clock
//! skew) is out of reach here; those are covered against
//! `aegis-transport-nats` separately.
//!
//! `properties` holds the eight universal properties spec §8 names;
//! `scenarios` holds the six named end-to-end walkthroughs (S1-S6). Both
//! expose plain `run`/`run_for` entry points alongside their own
//! `#[cfg(test)]` modules, so the whole suite doubles as a library a
//! downstream adapter crate can call into from its own test binary.

mod support;

pub mod properties;
pub mod scenarios;
