//! Status collection runtime: log windows, probes, the peer-count cache, the
//! section producers and the snapshot assembler that ties them together.

pub mod assembler;
pub mod cache;
pub mod collectors;
pub mod logtext;
pub mod probe;
