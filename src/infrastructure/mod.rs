//! Infrastructure layer: simulated implementations of every collaborator
//! port, used by the demo binary and the test suite.

pub mod in_memory;
