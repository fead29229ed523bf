//! Type conversion and formatting utilities.
//!
//! On-chain integers are widened into `BigUint` without ever passing
//! through a float, so `liquidity` and `sqrtPriceX96` keep every digit.

use alloy::primitives::{hex, Address, Uint};
use num_bigint::BigUint;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Lowercase 0x-prefixed form of an address, used as the token/pool id.
pub fn address_to_id(address: Address) -> String {
    hex_encode(address.as_slice())
}

// ============================================
// Big Integer Conversions
// ============================================

/// Convert any alloy unsigned integer (uint128, uint160, uint256, ...) to `BigUint`.
pub fn uint_to_biguint<const BITS: usize, const LIMBS: usize>(value: Uint<BITS, LIMBS>) -> BigUint {
    BigUint::from_bytes_le(&value.to_le_bytes_vec())
}
