//! # Buffer Adapter
//!
//! Accepts a JS value that is a string, a plain array of byte-sized integers,
//! or a typed-array/`ArrayBuffer` view, and presents it as a contiguous byte
//! buffer. The engine's own GC may move or free the backing store of a typed
//! array between ticks, so — unlike the original's pointer-with-lifetime
//! design — this adapter always returns an owned copy; callers needing to
//! avoid the copy should keep their own `TypedArray` handle alive and read
//! `as_bytes()` directly instead of going through this adapter.

use crate::error::ArgumentError;
use rquickjs::{Array, Ctx, String as JsString, TypedArray, Value};

/// Coerces a JS value into an owned byte buffer per the three accepted shapes.
pub fn coerce_bytes(value: &Value<'_>) -> Result<Vec<u8>, ArgumentError> {
    if let Ok(s) = JsString::from_value(value.clone()) {
        let s = s
            .to_string()
            .map_err(|e| ArgumentError(format!("invalid UTF-16 in string argument: {e}")))?;
        return Ok(s.into_bytes());
    }

    if let Ok(ta) = TypedArray::<u8>::from_value(value.clone()) {
        return Ok(ta.as_bytes().map(|b| b.to_vec()).unwrap_or_default());
    }

    if let Ok(arr) = Array::from_value(value.clone()) {
        let mut out = Vec::with_capacity(arr.len());
        for item in arr.iter::<i64>() {
            let n = item.map_err(|e| ArgumentError(format!("invalid byte array element: {e}")))?;
            if !(0..=255).contains(&n) {
                return Err(ArgumentError(format!("byte array element out of range: {n}")));
            }
            out.push(n as u8);
        }
        return Ok(out);
    }

    Err(ArgumentError(
        "expected a string, byte array, or typed-array view".into(),
    ))
}

/// Allocates a fresh owned JS `Uint8Array` from a byte slice, the shape every
/// stream `message` event payload takes (spec.md §4.3 read loop).
pub fn bytes_to_uint8array<'js>(ctx: &Ctx<'js>, data: &[u8]) -> rquickjs::Result<TypedArray<'js, u8>> {
    TypedArray::new_copy(ctx.clone(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn string_and_typed_array_produce_equal_bytes() {
        let rt = Runtime::new().unwrap();
        let ctx = Context::full(&rt).unwrap();
        ctx.with(|ctx| {
            let s = JsString::from_str(ctx.clone(), "ping").unwrap().into_value();
            let from_string = coerce_bytes(&s).unwrap();
            assert_eq!(from_string, b"ping");

            let ta = TypedArray::<u8>::new_copy(ctx.clone(), b"ping").unwrap();
            let from_ta = coerce_bytes(&ta.into_value()).unwrap();
            assert_eq!(from_ta, b"ping");
        });
    }

    #[test]
    fn plain_array_of_bytes_is_accepted() {
        let rt = Runtime::new().unwrap();
        let ctx = Context::full(&rt).unwrap();
        ctx.with(|ctx| {
            let arr = Array::new(ctx.clone()).unwrap();
            arr.set(0, 104u32).unwrap();
            arr.set(1, 105u32).unwrap();
            let bytes = coerce_bytes(&arr.into_value()).unwrap();
            assert_eq!(bytes, b"hi");
        });
    }

    #[test]
    fn out_of_range_array_element_is_rejected() {
        let rt = Runtime::new().unwrap();
        let ctx = Context::full(&rt).unwrap();
        ctx.with(|ctx| {
            let arr = Array::new(ctx.clone()).unwrap();
            arr.set(0, 999u32).unwrap();
            assert!(coerce_bytes(&arr.into_value()).is_err());
        });
    }
}
