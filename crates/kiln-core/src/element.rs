//! Typed views over the shared buffer.
//!
//! [`Element`] is implemented for the ten native scalar types and maps
//! each onto the std atomic of the same width. [`AtomicElement`] adds the
//! read-modify-write operations for the integer types that may be
//! declared atomic (8, 16 and 32 bits). Both traits are sealed.

use std::fmt;
use std::sync::atomic::{
    AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicU8,
    Ordering,
};

use crate::buffer::SharedBuffer;

mod sealed {
    pub trait Sealed {}
}

/// A scalar type readable and writable at a byte offset.
///
/// The `*_raw` methods take absolute buffer offsets and are used by
/// [`AddressSpace`](crate::AddressSpace); call the address space instead.
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static + sealed::Sealed {
    /// Size and alignment in bytes.
    const WIDTH: usize;
    /// Type tag, e.g. `"u16"`.
    const NAME: &'static str;

    #[doc(hidden)]
    fn load_raw(buf: &SharedBuffer, byte: usize, order: Ordering) -> Self;

    #[doc(hidden)]
    fn store_raw(buf: &SharedBuffer, byte: usize, value: Self, order: Ordering);
}

/// An integer type with atomic read-modify-write operations.
///
/// All operations are sequentially consistent. Arithmetic wraps.
pub trait AtomicElement: Element {
    #[doc(hidden)]
    fn compare_exchange_raw(
        buf: &SharedBuffer,
        byte: usize,
        current: Self,
        new: Self,
    ) -> Result<Self, Self>;

    #[doc(hidden)]
    fn swap_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self;

    #[doc(hidden)]
    fn fetch_add_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self;

    #[doc(hidden)]
    fn fetch_sub_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self;

    #[doc(hidden)]
    fn fetch_and_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self;

    #[doc(hidden)]
    fn fetch_or_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self;

    #[doc(hidden)]
    fn fetch_xor_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self;
}

macro_rules! int_element {
    ($t:ty, $atomic:ty, $name:literal) => {
        impl sealed::Sealed for $t {}

        impl Element for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();
            const NAME: &'static str = $name;

            fn load_raw(buf: &SharedBuffer, byte: usize, order: Ordering) -> Self {
                buf.cell::<$atomic>(byte).load(order)
            }

            fn store_raw(buf: &SharedBuffer, byte: usize, value: Self, order: Ordering) {
                buf.cell::<$atomic>(byte).store(value, order)
            }
        }
    };
}

macro_rules! atomic_element {
    ($t:ty, $atomic:ty) => {
        impl AtomicElement for $t {
            fn compare_exchange_raw(
                buf: &SharedBuffer,
                byte: usize,
                current: Self,
                new: Self,
            ) -> Result<Self, Self> {
                buf.cell::<$atomic>(byte).compare_exchange(
                    current,
                    new,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
            }

            fn swap_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self {
                buf.cell::<$atomic>(byte).swap(value, Ordering::SeqCst)
            }

            fn fetch_add_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self {
                buf.cell::<$atomic>(byte).fetch_add(value, Ordering::SeqCst)
            }

            fn fetch_sub_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self {
                buf.cell::<$atomic>(byte).fetch_sub(value, Ordering::SeqCst)
            }

            fn fetch_and_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self {
                buf.cell::<$atomic>(byte).fetch_and(value, Ordering::SeqCst)
            }

            fn fetch_or_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self {
                buf.cell::<$atomic>(byte).fetch_or(value, Ordering::SeqCst)
            }

            fn fetch_xor_raw(buf: &SharedBuffer, byte: usize, value: Self) -> Self {
                buf.cell::<$atomic>(byte).fetch_xor(value, Ordering::SeqCst)
            }
        }
    };
}

int_element!(u8, AtomicU8, "u8");
int_element!(i8, AtomicI8, "i8");
int_element!(u16, AtomicU16, "u16");
int_element!(i16, AtomicI16, "i16");
int_element!(u32, AtomicU32, "u32");
int_element!(i32, AtomicI32, "i32");
int_element!(u64, AtomicU64, "u64");
int_element!(i64, AtomicI64, "i64");

atomic_element!(u8, AtomicU8);
atomic_element!(i8, AtomicI8);
atomic_element!(u16, AtomicU16);
atomic_element!(i16, AtomicI16);
atomic_element!(u32, AtomicU32);
atomic_element!(i32, AtomicI32);

impl sealed::Sealed for f32 {}

impl Element for f32 {
    const WIDTH: usize = 4;
    const NAME: &'static str = "f32";

    fn load_raw(buf: &SharedBuffer, byte: usize, order: Ordering) -> Self {
        f32::from_bits(buf.cell::<AtomicU32>(byte).load(order))
    }

    fn store_raw(buf: &SharedBuffer, byte: usize, value: Self, order: Ordering) {
        buf.cell::<AtomicU32>(byte).store(value.to_bits(), order)
    }
}

impl sealed::Sealed for f64 {}

impl Element for f64 {
    const WIDTH: usize = 8;
    const NAME: &'static str = "f64";

    fn load_raw(buf: &SharedBuffer, byte: usize, order: Ordering) -> Self {
        f64::from_bits(buf.cell::<AtomicU64>(byte).load(order))
    }

    fn store_raw(buf: &SharedBuffer, byte: usize, value: Self, order: Ordering) {
        buf.cell::<AtomicU64>(byte).store(value.to_bits(), order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_native_sizes() {
        assert_eq!(<u8 as Element>::WIDTH, 1);
        assert_eq!(<i16 as Element>::WIDTH, 2);
        assert_eq!(<u32 as Element>::WIDTH, 4);
        assert_eq!(<f32 as Element>::WIDTH, 4);
        assert_eq!(<i64 as Element>::WIDTH, 8);
        assert_eq!(<f64 as Element>::WIDTH, 8);
    }

    #[test]
    fn float_bits_survive() {
        let buf = SharedBuffer::new(16);
        f64::store_raw(&buf, 8, -0.0, Ordering::Relaxed);
        let back = f64::load_raw(&buf, 8, Ordering::Relaxed);
        assert!(back == 0.0 && back.is_sign_negative());
    }

    #[test]
    fn fetch_add_wraps() {
        let buf = SharedBuffer::new(8);
        u8::store_raw(&buf, 3, 250, Ordering::Relaxed);
        assert_eq!(u8::fetch_add_raw(&buf, 3, 10), 250);
        assert_eq!(u8::load_raw(&buf, 3, Ordering::Relaxed), 4);
    }

    #[test]
    fn compare_exchange_reports_current_on_failure() {
        let buf = SharedBuffer::new(8);
        i32::store_raw(&buf, 4, -7, Ordering::Relaxed);
        assert_eq!(i32::compare_exchange_raw(&buf, 4, 0, 1), Err(-7));
        assert_eq!(i32::compare_exchange_raw(&buf, 4, -7, 1), Ok(-7));
        assert_eq!(i32::load_raw(&buf, 4, Ordering::Relaxed), 1);
    }
}
