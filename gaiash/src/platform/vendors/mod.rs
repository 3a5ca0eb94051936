//! Vendor platform definitions.

pub mod gaia;
