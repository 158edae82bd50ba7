//! Host-side payload values.

use actionhost_plugin_sdk::{PayloadData, PayloadTag, RawPayload, StringView};

/// Value passed to an action. String payloads borrow their text.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Payload<'a> {
    #[default]
    None,
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(&'a str),
}

impl Payload<'_> {
    pub fn tag(&self) -> PayloadTag {
        match self {
            Payload::None => PayloadTag::None,
            Payload::Int32(_) => PayloadTag::Int32,
            Payload::Int64(_) => PayloadTag::Int64,
            Payload::UInt32(_) => PayloadTag::UInt32,
            Payload::UInt64(_) => PayloadTag::UInt64,
            Payload::Float(_) => PayloadTag::Float,
            Payload::Double(_) => PayloadTag::Double,
            Payload::String(_) => PayloadTag::String,
        }
    }

    /// Run `f` with the contract form of this payload. The raw payload
    /// points into this frame and must not escape `f`.
    pub(crate) fn with_raw<R>(&self, f: impl FnOnce(RawPayload) -> R) -> R {
        let data = match *self {
            Payload::None => return f(RawPayload::NONE),
            Payload::Int32(int32) => PayloadData { int32 },
            Payload::Int64(int64) => PayloadData { int64 },
            Payload::UInt32(uint32) => PayloadData { uint32 },
            Payload::UInt64(uint64) => PayloadData { uint64 },
            Payload::Float(float) => PayloadData { float },
            Payload::Double(double) => PayloadData { double },
            Payload::String(text) => PayloadData {
                string: StringView::new(text),
            },
        };
        f(RawPayload {
            tag: self.tag().raw(),
            data: &data,
        })
    }
}

macro_rules! payload_from {
    ($($ty:ty => $variant:ident,)*) => {
        $(
            impl From<$ty> for Payload<'_> {
                fn from(value: $ty) -> Self {
                    Payload::$variant(value)
                }
            }
        )*
    };
}

payload_from! {
    i32 => Int32,
    i64 => Int64,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
}

impl<'a> From<&'a str> for Payload<'a> {
    fn from(value: &'a str) -> Self {
        Payload::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actionhost_plugin_sdk::PayloadValue;

    #[test]
    fn test_raw_form_decodes_to_same_value() {
        let text = String::from("hello");
        let cases = [
            (Payload::None, PayloadValue::None),
            (Payload::from(-5i32), PayloadValue::Int32(-5)),
            (Payload::from(7u64), PayloadValue::UInt64(7)),
            (Payload::from(1.5f64), PayloadValue::Double(1.5)),
            (Payload::from(text.as_str()), PayloadValue::String(b"hello")),
        ];
        for (payload, expected) in cases {
            let decoded = payload.with_raw(|raw| unsafe { raw.decode() });
            assert_eq!(decoded, Some(expected));
        }
    }
}
