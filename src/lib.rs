//! Operator CLI for the chargeguard portal integration core.
//!
//! The command surface lives in [`cli`]; the portal machinery itself is in the
//! workspace crates (`portal-adapter` and friends).

pub mod cli;
