//! Host process integration: the NDJSON stdio bridge.

pub mod stdio;
