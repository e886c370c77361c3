//! The activity ledger is organized through [store::JsonLedgerStore].
//! The basic idea is:
//!  - There is a single JSON document with every activity seen so far.
//!  - An activity holds one time entry per completed foreground interval.
//!  - The document is rewritten wholesale after every transition, through an
//!    atomic replace, so an interrupted write never leaves a torn file.

pub mod duration;
pub mod entities;
pub mod store;
