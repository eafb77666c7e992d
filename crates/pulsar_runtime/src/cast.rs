//! Bit-width-exact value conversions.
//!
//! Generated expression code casts every operand to its result storage type
//! through [`ValueCastTo`], covering the primitive integers, `bool`, and
//! the arbitrary-precision types used for values wider than 64 bits.
//! Narrowing truncates, widening from a signed source sign-extends, and
//! `bool` maps to 0/1, the same semantics a hardware slice/extend has.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};

/// Conversion into a target storage type with hardware cast semantics.
pub trait ValueCastTo<T> {
    /// Converts `self` into the target type.
    fn cast(&self) -> T;
}

macro_rules! impl_prim_casts {
    ($src:ty => $($dst:ty),+) => {
        $(
            impl ValueCastTo<$dst> for $src {
                fn cast(&self) -> $dst {
                    *self as $dst
                }
            }
        )+
    };
}

impl_prim_casts!(u8 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(u16 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(u32 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(u64 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(i8 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(i16 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(i32 => u8, u16, u32, u64, i8, i16, i32, i64);
impl_prim_casts!(i64 => u8, u16, u32, u64, i8, i16, i32, i64);

macro_rules! impl_bool_casts {
    ($($t:ty),+) => {
        $(
            impl ValueCastTo<bool> for $t {
                fn cast(&self) -> bool {
                    *self != 0
                }
            }

            impl ValueCastTo<$t> for bool {
                fn cast(&self) -> $t {
                    (*self as u8) as $t
                }
            }
        )+
    };
}

impl_bool_casts!(u8, u16, u32, u64, i8, i16, i32, i64);

impl ValueCastTo<bool> for bool {
    fn cast(&self) -> bool {
        *self
    }
}

/// The low 64 bits of a `BigInt` in two's-complement form.
fn bigint_low64(x: &BigInt) -> u64 {
    let (sign, digits) = x.to_u64_digits();
    let low = digits.first().copied().unwrap_or(0);
    match sign {
        Sign::Minus => low.wrapping_neg(),
        _ => low,
    }
}

/// The low 64 bits of a `BigUint`.
fn biguint_low64(x: &BigUint) -> u64 {
    x.to_u64_digits().first().copied().unwrap_or(0)
}

macro_rules! impl_big_casts {
    ($($t:ty),+) => {
        $(
            impl ValueCastTo<BigUint> for $t {
                fn cast(&self) -> BigUint {
                    // Signed sources contribute their 64-bit two's complement.
                    BigUint::from(*self as u64)
                }
            }

            impl ValueCastTo<BigInt> for $t {
                fn cast(&self) -> BigInt {
                    BigInt::from(*self)
                }
            }

            impl ValueCastTo<$t> for BigUint {
                fn cast(&self) -> $t {
                    biguint_low64(self) as $t
                }
            }

            impl ValueCastTo<$t> for BigInt {
                fn cast(&self) -> $t {
                    match self.to_i64() {
                        Some(v) => v as $t,
                        None => bigint_low64(self) as $t,
                    }
                }
            }
        )+
    };
}

impl_big_casts!(u8, u16, u32, u64, i8, i16, i32, i64);

impl ValueCastTo<BigUint> for bool {
    fn cast(&self) -> BigUint {
        BigUint::from(*self as u8)
    }
}

impl ValueCastTo<BigInt> for bool {
    fn cast(&self) -> BigInt {
        BigInt::from(*self as u8)
    }
}

impl ValueCastTo<bool> for BigUint {
    fn cast(&self) -> bool {
        !self.is_zero()
    }
}

impl ValueCastTo<bool> for BigInt {
    fn cast(&self) -> bool {
        !self.is_zero()
    }
}

impl ValueCastTo<BigUint> for BigUint {
    fn cast(&self) -> BigUint {
        self.clone()
    }
}

impl ValueCastTo<BigInt> for BigInt {
    fn cast(&self) -> BigInt {
        self.clone()
    }
}

impl ValueCastTo<BigInt> for BigUint {
    fn cast(&self) -> BigInt {
        BigInt::from(self.clone())
    }
}

impl ValueCastTo<BigUint> for BigInt {
    fn cast(&self) -> BigUint {
        match self.sign() {
            Sign::Minus => BigUint::from(bigint_low64(self)),
            _ => self.magnitude().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_unsigned_zero_extends() {
        let x: u8 = 0xff;
        let y: u64 = ValueCastTo::<u64>::cast(&x);
        assert_eq!(y, 0xff);
    }

    #[test]
    fn widening_signed_sign_extends() {
        let x: i8 = -1;
        let y: i64 = ValueCastTo::<i64>::cast(&x);
        assert_eq!(y, -1);
        let z: u64 = ValueCastTo::<u64>::cast(&x);
        assert_eq!(z, u64::MAX);
    }

    #[test]
    fn narrowing_truncates() {
        let x: u64 = 0x1_0000_0003;
        let y: u32 = ValueCastTo::<u32>::cast(&x);
        assert_eq!(y, 3);
    }

    #[test]
    fn bool_maps_to_zero_one() {
        let t: u8 = ValueCastTo::<u8>::cast(&true);
        let f: u8 = ValueCastTo::<u8>::cast(&false);
        assert_eq!((t, f), (1, 0));
        assert!(ValueCastTo::<bool>::cast(&3u32));
        assert!(!ValueCastTo::<bool>::cast(&0u32));
    }

    #[test]
    fn biguint_roundtrip_under_64_bits() {
        let x: u64 = 0xdead_beef_cafe_f00d;
        let big: BigUint = ValueCastTo::<BigUint>::cast(&x);
        let back: u64 = ValueCastTo::<u64>::cast(&big);
        assert_eq!(back, x);
    }

    #[test]
    fn biguint_truncates_above_64_bits() {
        let big = BigUint::from(1u8) << 64u32;
        let low: u64 = ValueCastTo::<u64>::cast(&big);
        assert_eq!(low, 0);
        let big = (BigUint::from(1u8) << 64u32) | BigUint::from(7u8);
        let low: u64 = ValueCastTo::<u64>::cast(&big);
        assert_eq!(low, 7);
    }

    #[test]
    fn bigint_negative_to_unsigned_wraps() {
        let big = BigInt::from(-1);
        let low: u64 = ValueCastTo::<u64>::cast(&big);
        assert_eq!(low, u64::MAX);
    }

    #[test]
    fn concat_style_shift_or() {
        // concat(msb=0xab, lsb=0xcd) over 8-bit halves.
        let msb: BigUint = ValueCastTo::<BigUint>::cast(&0xabu8);
        let lsb: BigUint = ValueCastTo::<BigUint>::cast(&0xcdu8);
        let joined = (msb << 8u32) | lsb;
        let got: u16 = ValueCastTo::<u16>::cast(&joined);
        assert_eq!(got, 0xabcd);
    }
}
