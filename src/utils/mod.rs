//! Utility functions for the sync pipeline.
//!
//! - [`conversion`] - Type conversions (alloy integers to BigUint, hex encoding)

mod conversion;

pub use conversion::{address_to_id, hex_encode, uint_to_biguint};
