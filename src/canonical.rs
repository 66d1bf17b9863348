//! Canonicalization functionality for signature generation and validation.
//!
//! This includes the percent-encoding and decoding rules used for the string to sign and the
//! deterministic serialization of request parameters (the `signature` template component).
//!
//! **Stability of this module is not guaranteed except for items exposed at the crate root**.
//! The functions and types are subject to change in minor/patch versions. This is exposed for
//! testing purposes only.

use {
    crate::SignatureError,
    log::trace,
    qualifier_attr::qualifiers,
    serde::Serialize,
    serde_json::{ser::Formatter as JsonFormatter, Serializer as JsonSerializer, Value},
    std::{borrow::Cow, collections::BTreeMap, io},
};

/// Uppercase hex digits.
const HEX_DIGITS_UPPER: [u8; 16] =
    [b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'A', b'B', b'C', b'D', b'E', b'F'];

/// Request parameters merged from the query string and body, keyed by their original (not lowercased) name.
///
/// The map's ordering is the byte ordering of the keys, which is the order parameters are signed in.
pub type Parameters = BTreeMap<String, Value>;

/// JSON formatter that writes `/` as `\/`. Structured parameter values are signed in this form so that
/// signatures agree with clients whose JSON encoders escape slashes.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[derive(Clone, Copy, Debug, Default)]
struct EscapedSlashFormatter;

impl JsonFormatter for EscapedSlashFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut pieces = fragment.split('/');
        if let Some(first) = pieces.next() {
            writer.write_all(first.as_bytes())?;
        }

        for piece in pieces {
            writer.write_all(b"\\/")?;
            writer.write_all(piece.as_bytes())?;
        }

        Ok(())
    }
}

/// Canonicalize request parameters into the `key=value&key=value` block that is signed.
///
/// Parameters are visited in byte order of their original keys. Each key is lowercased, then the key
/// and the stringified value are [percent-encoded][rfc3986_encode]. An empty parameter set produces an
/// empty string.
pub fn canonicalize_parameters(params: &Parameters) -> Result<String, SignatureError> {
    let mut pairs = Vec::with_capacity(params.len());

    for (key, value) in params.iter() {
        let value = parameter_value_to_string(value)?;
        pairs.push(format!("{}={}", rfc3986_encode(key.to_lowercase().as_bytes()), rfc3986_encode(value.as_bytes())));
    }

    let result = pairs.join("&");
    trace!("Canonical parameters: {}", result);
    Ok(result)
}

/// Convert a single parameter value to the string that is percent-encoded into the canonical block.
///
/// Arrays and objects become compact JSON with non-ASCII characters left as-is; strings are used
/// directly; `true` is `"1"`; `false` and `null` are empty.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
fn parameter_value_to_string(value: &Value) -> Result<Cow<'_, str>, SignatureError> {
    match value {
        Value::String(s) => Ok(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Ok(Cow::Owned(n.to_string())),
        Value::Bool(true) => Ok(Cow::Borrowed("1")),
        Value::Bool(false) | Value::Null => Ok(Cow::Borrowed("")),
        Value::Array(_) | Value::Object(_) => {
            let mut buffer = Vec::with_capacity(64);
            let mut serializer = JsonSerializer::with_formatter(&mut buffer, EscapedSlashFormatter);
            value.serialize(&mut serializer).map_err(|e| SignatureError::InternalServiceError(Box::new(e)))?;
            String::from_utf8(buffer).map(Cow::Owned).map_err(|e| SignatureError::InternalServiceError(Box::new(e)))
        }
    }
}

/// Percent-encode bytes according to RFC 3986: unreserved characters are kept, everything else
/// (including space) is written as `%XX` with uppercase hex digits.
pub fn rfc3986_encode(input: &[u8]) -> String {
    let mut result = String::with_capacity(input.len());

    for &c in input {
        if is_rfc3986_unreserved(c) {
            result.push(c as char);
        } else {
            let hex = u8_to_upper_hex(c);
            result.push('%');
            result.push(hex[0] as char);
            result.push(hex[1] as char);
        }
    }

    result
}

/// Decode a form-style URL-encoded string into raw bytes.
///
/// `+` decodes to a space and `%XX` decodes to the byte `XX`. A `%` that is not followed by two hex
/// digits is kept literally; this never fails.
pub fn form_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                result.push(b' ');
                i += 1;
            }
            b'%' => {
                let high = bytes.get(i + 1).and_then(|&c| hex_value(c));
                let low = bytes.get(i + 2).and_then(|&c| hex_value(c));
                match (high, low) {
                    (Some(high), Some(low)) => {
                        result.push((high << 4) | low);
                        i += 3;
                    }
                    _ => {
                        result.push(b'%');
                        i += 1;
                    }
                }
            }
            c => {
                result.push(c);
                i += 1;
            }
        }
    }

    result
}

/// Indicates whether the specified byte is RFC3986 unreserved -- i.e., can be represented without being
/// percent-encoded, e.g. '?' -> '%3F'.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
fn is_rfc3986_unreserved(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'.' || c == b'_' || c == b'~'
}

/// Value of a single hex digit, either case.
#[inline(always)]
const fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Convert a byte to uppercase hex representation.

#[cfg_attr(any(doc, feature = "unstable"), qualifiers(pub))]
#[cfg_attr(not(any(doc, feature = "unstable")), qualifiers(pub(crate)))]
#[inline(always)]
const fn u8_to_upper_hex(b: u8) -> [u8; 2] {
    [HEX_DIGITS_UPPER[((b >> 4) & 0xf) as usize], HEX_DIGITS_UPPER[(b & 0xf) as usize]]
}
