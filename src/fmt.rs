//! Logging backend selection.
//!
//! Firmware builds log through `defmt` over RTT. Host builds (unit tests,
//! tooling) route the same macros to the `log` facade so library code is
//! written once.

#[cfg(target_os = "none")]
#[allow(unused_imports)]
pub use defmt::{debug, error, info, trace, warn};

#[cfg(not(target_os = "none"))]
#[allow(unused_imports)]
pub use log::{debug, error, info, trace, warn};
