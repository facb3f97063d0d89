//! End-to-end resolution scenarios consolidated into one harness target.

mod suite;
