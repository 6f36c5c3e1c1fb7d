//! Domain entities for Tapwise.
//!
//! Pure logic with no OS dependencies: everything here compiles and tests on
//! any host. The daemon feeds these functions with data read from Quartz,
//! IOKit and the window server.

pub mod device;
pub mod geometry;
pub mod scroll;
pub mod snap;
pub mod window;
