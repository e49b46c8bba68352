//! Translation between native and REIL addresses.
//!
//! One native instruction expands to many REIL instructions. Every native
//! address `a` owns the REIL address range
//! `[a * INSTRUCTION_MULTIPLIER, a * INSTRUCTION_MULTIPLIER + 0xff]`, and
//! the i-th REIL instruction emitted for the native instruction at `a`
//! receives REIL address `a * INSTRUCTION_MULTIPLIER + i`. Breakpoint
//! translation and REIL-to-native lookups in both directions depend on
//! every architecture translator honoring this scheme.

use crate::Error;

/// The number of REIL addresses reserved per native instruction.
pub const INSTRUCTION_MULTIPLIER: u64 = 0x100;

/// The REIL address of the first REIL instruction for the native
/// instruction at `address`.
/// # Errors
/// Error if the doubled address does not fit in a `u64`.
pub fn to_reil_address(address: u64) -> Result<u64, Error> {
    address.checked_mul(INSTRUCTION_MULTIPLIER).ok_or_else(|| {
        Error::Custom(format!(
            "native address 0x{:x} does not fit the REIL address space",
            address
        ))
    })
}

/// The native address which owns the given REIL address. The REIL
/// sub-index is discarded, so this direction is lossy.
pub fn to_native_address(reil_address: u64) -> u64 {
    reil_address / INSTRUCTION_MULTIPLIER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_law() {
        for address in [0u64, 1, 0x1000, 0xdeadbeef] {
            for offset in 0..INSTRUCTION_MULTIPLIER {
                assert_eq!(
                    to_native_address(to_reil_address(address).unwrap() + offset),
                    address
                );
            }
        }
    }

    #[test]
    fn reil_addresses_are_multiples_of_the_multiplier() {
        assert_eq!(to_reil_address(0x1000).unwrap(), 0x100000);
        assert_eq!(to_reil_address(0).unwrap(), 0);
    }

    #[test]
    fn addresses_past_the_doubling_limit_are_rejected() {
        assert!(to_reil_address(u64::MAX / INSTRUCTION_MULTIPLIER).is_ok());
        assert!(to_reil_address(u64::MAX / INSTRUCTION_MULTIPLIER + 1).is_err());
        assert!(to_reil_address(u64::MAX).is_err());
    }
}
