//! Connectivity verification.
//!
//! [`build_oracle`] derives the expected reachability of every host pair from
//! a plan. [`ProbeRunner`] checks those expectations against a live network
//! through a [`Probe`] implementation such as [`CommandProbe`].

pub mod command;
pub mod oracle;
pub mod probe;

pub use command::CommandProbe;
pub use oracle::{build_oracle, PairExpectation, Reachability, ReachabilityMatrix, Reason};
pub use probe::{CancelToken, Probe, ProbeError, ProbeOutcome, ProbeRequest, ProbeResult, ProbeRunner, VerificationReport};
