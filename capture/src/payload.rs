//! Capturing message payloads: [`Payload`], [`PayloadVisitor`] and [`CapturedPayload`].

use serde::{Deserialize, Serialize};

use std::{any, fmt, str};

/// Visitor for the three ways a payload can present itself for capture.
///
/// Exactly one of the methods is expected to be called per visit; if several are called,
/// the last call wins.
pub trait PayloadVisitor {
    /// Records a payload that renders itself as a string.
    fn visit_str(&mut self, value: &str);
    /// Records a structured payload encoded to bytes, together with an optional descriptor
    /// of its type or schema.
    fn visit_bytes(&mut self, bytes: &[u8], descriptor: Option<&str>);
    /// Records an opaque payload via its [`Debug`](fmt::Debug) implementation.
    fn visit_debug(&mut self, value: &dyn fmt::Debug);
}

/// Message payload that can be captured in a trace.
///
/// Implementations choose how the payload is presented by calling one of the
/// [`PayloadVisitor`] methods. Implementations must not fail; encoding errors should be
/// reported as a string (see [`Json`] for an example).
///
/// # Examples
///
/// ```
/// # use rpcz_capture::{CapturedPayload, Payload, PayloadVisitor};
/// struct Ping {
///     seq: u32,
/// }
///
/// impl Payload for Ping {
///     fn visit(&self, visitor: &mut dyn PayloadVisitor) {
///         visitor.visit_str(&format!("ping #{}", self.seq));
///     }
/// }
///
/// let captured = CapturedPayload::capture(&Ping { seq: 3 });
/// assert_eq!(captured.as_str(), Some("ping #3"));
/// ```
pub trait Payload {
    /// Presents this payload to the visitor.
    fn visit(&self, visitor: &mut dyn PayloadVisitor);
}

impl Payload for str {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_str(self);
    }
}

impl Payload for String {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_str(self);
    }
}

impl Payload for [u8] {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_bytes(self, None);
    }
}

impl Payload for Vec<u8> {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_bytes(self, None);
    }
}

impl Payload for () {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_debug(self);
    }
}

macro_rules! impl_debug_payload {
    ($($ty:ty),+) => {
        $(
        impl Payload for $ty {
            fn visit(&self, visitor: &mut dyn PayloadVisitor) {
                visitor.visit_debug(self);
            }
        }
        )+
    };
}

impl_debug_payload!(bool, i8, i16, i32, i64, i128, u8, u16, u32, u64, u128, f32, f64);

impl<T: Payload + ?Sized> Payload for &T {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        (**self).visit(visitor);
    }
}

impl<T: Payload + ?Sized> Payload for Box<T> {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        (**self).visit(visitor);
    }
}

impl<T: Payload> Payload for Option<T> {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        match self {
            Some(payload) => payload.visit(visitor),
            None => visitor.visit_debug(&None::<()>),
        }
    }
}

/// Payload wrapper capturing the [`Display`](fmt::Display) presentation of the wrapped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Text<T>(pub T);

impl<T: fmt::Display> Payload for Text<T> {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_str(&self.0.to_string());
    }
}

/// Payload wrapper capturing the [`Debug`](fmt::Debug) presentation of the wrapped value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opaque<T>(pub T);

impl<T: fmt::Debug> Payload for Opaque<T> {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        visitor.visit_debug(&self.0);
    }
}

/// Payload wrapper capturing the wrapped value as a structured message encoded to JSON.
/// The type name of the value is used as the descriptor.
///
/// If serialization fails, an inline marker string describing the failure is captured instead.
///
/// # Examples
///
/// ```
/// # use serde::Serialize;
/// # use rpcz_capture::{CapturedPayload, Json};
/// #[derive(Serialize)]
/// struct Greeting {
///     name: &'static str,
/// }
///
/// let captured = CapturedPayload::capture(&Json(Greeting { name: "Ferris" }));
/// let (bytes, descriptor) = captured.as_bytes().unwrap();
/// assert_eq!(bytes, br#"{"name":"Ferris"}"#);
/// assert!(descriptor.unwrap().ends_with("Greeting"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> Payload for Json<T> {
    fn visit(&self, visitor: &mut dyn PayloadVisitor) {
        let descriptor = any::type_name::<T>();
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => visitor.visit_bytes(&bytes, Some(descriptor)),
            Err(err) => visitor.visit_str(&format!("<failed to encode {descriptor}: {err}>")),
        }
    }
}

/// Lossy presentation of a captured message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CapturedPayload {
    /// Payload rendered as a string.
    String(String),
    /// Structured payload encoded to bytes.
    Bytes {
        /// Encoded payload.
        data: Vec<u8>,
        /// Descriptor of the payload type or schema, if known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        descriptor: Option<String>,
    },
    /// Opaque payload rendered via its [`Debug`](fmt::Debug) implementation.
    Object(String),
}

impl CapturedPayload {
    /// Captures the specified payload.
    pub fn capture(payload: &(impl Payload + ?Sized)) -> Self {
        let mut visitor = Capturer::default();
        payload.visit(&mut visitor);
        visitor
            .captured
            .unwrap_or_else(|| Self::Object(String::new()))
    }

    /// Returns the string presentation, or `None` if the payload is not a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the encoded bytes and the descriptor, or `None` if the payload is not
    /// a structured one.
    pub fn as_bytes(&self) -> Option<(&[u8], Option<&str>)> {
        match self {
            Self::Bytes { data, descriptor } => Some((data, descriptor.as_deref())),
            _ => None,
        }
    }

    /// Returns the [`Debug`](fmt::Debug) presentation of an opaque payload, or `None`
    /// if the payload is not opaque.
    pub fn as_debug_str(&self) -> Option<&str> {
        match self {
            Self::Object(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CapturedPayload {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Object(s) => formatter.write_str(s),
            Self::Bytes { data, descriptor } => {
                if let Some(descriptor) = descriptor {
                    write!(formatter, "{descriptor} ")?;
                }
                match str::from_utf8(data) {
                    Ok(text) => formatter.write_str(text),
                    Err(_) => write!(formatter, "<{} bytes>", data.len()),
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct Capturer {
    captured: Option<CapturedPayload>,
}

impl PayloadVisitor for Capturer {
    fn visit_str(&mut self, value: &str) {
        self.captured = Some(CapturedPayload::String(value.to_owned()));
    }

    fn visit_bytes(&mut self, bytes: &[u8], descriptor: Option<&str>) {
        self.captured = Some(CapturedPayload::Bytes {
            data: bytes.to_vec(),
            descriptor: descriptor.map(str::to_owned),
        });
    }

    fn visit_debug(&mut self, value: &dyn fmt::Debug) {
        self.captured = Some(CapturedPayload::Object(format!("{value:?}")));
    }
}
