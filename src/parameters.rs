//! Extraction of the signed parameter set from an HTTP request.
//!
//! Parameters come from the query string and, depending on the method and content type, from the body.
//! Query and form data use bracket notation for structured values (`tags[]=a&tags[]=b`,
//! `user[name]=x`), which is expanded into JSON arrays and objects before canonicalization.

use {
    crate::{
        canonical::{form_decode, Parameters},
        constants::{APPLICATION_X_WWW_FORM_URLENCODED, CHARSET, MAX_PARAMETER_COUNT, MAX_PARAMETER_NESTING_DEPTH},
        SignatureError,
    },
    bytes::Bytes,
    encoding::{all::UTF_8, label::encoding_from_whatwg_label, types::DecoderTrap},
    http::{
        header::{HeaderMap, HeaderValue, CONTENT_TYPE},
        request::Parts,
        Method,
    },
    log::{debug, trace},
    serde_json::{Map, Value},
};

/// A single bracketed segment of a structured parameter name.
#[derive(Clone, Debug, Eq, PartialEq)]
enum KeySegment {
    /// `[]`: append to the list.
    Push,

    /// `[name]`: set a member.
    Member(String),
}

/// Content type of a request body along with its optional charset.
#[derive(Debug)]
struct ContentTypeCharset {
    content_type: String,
    charset: Option<String>,
}

/// Collect the parameters that are signed for a request.
///
/// Query-string parameters are read first. A JSON body whose top level is an object is then merged in
/// for any method; a form body is merged for methods other than `GET` and `HEAD`. Body parameters
/// replace query parameters with the same name.
pub fn request_parameters(parts: &Parts, body: &Bytes) -> Result<Parameters, SignatureError> {
    let mut params = Parameters::new();
    parse_form_parameters(parts.uri.query().unwrap_or(""), &mut params)?;

    if body.is_empty() {
        return Ok(params);
    }

    let content_type = match get_content_type_and_charset(&parts.headers) {
        Some(content_type) => content_type,
        None => return Ok(params),
    };

    if is_json_content_type(&content_type.content_type) {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(members)) => {
                trace!("Merging {} JSON body members into parameters", members.len());
                params.extend(members);
            }
            Ok(_) => debug!("JSON body is not an object; no parameters taken from it"),
            Err(e) => debug!("JSON body could not be parsed; no parameters taken from it: {}", e),
        }
    } else if content_type.content_type == APPLICATION_X_WWW_FORM_URLENCODED
        && parts.method != Method::GET
        && parts.method != Method::HEAD
    {
        let encoding = match &content_type.charset {
            Some(charset) => match encoding_from_whatwg_label(charset.as_str()) {
                Some(encoding) => encoding,
                None => {
                    return Err(SignatureError::InvalidBodyEncoding(format!(
                        "application/x-www-form-urlencoded body uses unsupported charset '{}'",
                        charset
                    )))
                }
            },
            None => {
                trace!("Falling back to UTF-8 for application/x-www-form-urlencoded body");
                UTF_8
            }
        };

        let body_query = encoding.decode(body, DecoderTrap::Strict).map_err(|_| {
            SignatureError::InvalidBodyEncoding(format!(
                "Invalid body data encountered parsing application/x-www-form-urlencoded with charset '{}'",
                encoding.whatwg_name().unwrap_or(encoding.name())
            ))
        })?;

        let mut body_params = Parameters::new();
        parse_form_parameters(&body_query, &mut body_params)?;
        params.extend(body_params);
    }

    Ok(params)
}

/// Parse a query string or form body into `params`, expanding bracket notation.
///
/// A repeated plain name keeps its last value. Names with bracket segments build nested objects;
/// `[]` appends using the next free integer index. Objects whose members are exactly `"0"`, `"1"`, ...
/// in order are converted to arrays afterwards.
///
/// # Errors
/// Returns [`SignatureError::MalformedParameters`] if the data is not UTF-8 once decoded, has more than
/// 1000 parameters, or has a name with more than 64 bracket segments.
pub fn parse_form_parameters(input: &str, params: &mut Parameters) -> Result<(), SignatureError> {
    for (count, component) in input.split('&').filter(|c| !c.is_empty()).enumerate() {
        if count == MAX_PARAMETER_COUNT {
            return Err(SignatureError::MalformedParameters(format!(
                "Too many parameters; at most {} are allowed",
                MAX_PARAMETER_COUNT
            )));
        }

        let (raw_key, raw_value) = component.split_once('=').unwrap_or((component, ""));
        let key = decode_utf8(raw_key)?;
        let value = Value::String(decode_utf8(raw_value)?);

        let (name, segments) = split_key_segments(&key)?;
        if name.is_empty() {
            trace!("Ignoring parameter with empty name: {:?}", key);
            continue;
        }

        if segments.is_empty() {
            params.insert(name.to_string(), value);
        } else {
            let slot = params.entry(name.to_string()).or_insert(Value::Null);
            insert_nested(slot, &segments, value);
        }
    }

    for value in params.values_mut() {
        objects_to_lists(value);
    }

    Ok(())
}

fn decode_utf8(raw: &str) -> Result<String, SignatureError> {
    String::from_utf8(form_decode(raw))
        .map_err(|_| SignatureError::MalformedParameters(format!("Parameter data is not valid UTF-8: {}", raw)))
}

/// Split `name[a][]` into `("name", [Member("a"), Push])`. A name with an unterminated bracket is
/// treated as a plain name.
fn split_key_segments(key: &str) -> Result<(&str, Vec<KeySegment>), SignatureError> {
    let open = match key.find('[') {
        Some(open) if open > 0 => open,
        _ => return Ok((key, Vec::new())),
    };

    let (name, mut rest) = key.split_at(open);
    let mut segments = Vec::new();

    while let Some(inner) = rest.strip_prefix('[') {
        let close = match inner.find(']') {
            Some(close) => close,
            None if segments.is_empty() => return Ok((key, Vec::new())),
            // Anything after the last complete segment is ignored.
            None => break,
        };

        if segments.len() == MAX_PARAMETER_NESTING_DEPTH {
            return Err(SignatureError::MalformedParameters(format!(
                "Parameter {} is nested more than {} levels deep",
                name, MAX_PARAMETER_NESTING_DEPTH
            )));
        }

        let member = &inner[..close];
        segments.push(if member.is_empty() {
            KeySegment::Push
        } else {
            KeySegment::Member(member.to_string())
        });
        rest = &inner[close + 1..];
    }

    Ok((name, segments))
}

fn insert_nested(slot: &mut Value, segments: &[KeySegment], value: Value) {
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }

    if let Value::Object(members) = slot {
        let member = match &segments[0] {
            KeySegment::Push => next_index(members).to_string(),
            KeySegment::Member(name) => name.clone(),
        };

        if segments.len() == 1 {
            members.insert(member, value);
        } else {
            let child = members.entry(member).or_insert(Value::Null);
            insert_nested(child, &segments[1..], value);
        }
    }
}

/// The index `[]` appends at: one past the largest integer member, or zero.
fn next_index(members: &Map<String, Value>) -> u64 {
    members.keys().filter_map(|k| canonical_index(k)).max().map_or(0, |max| max + 1)
}

/// Parse `k` as a list index only if it is written in canonical decimal form (`"0"`, `"12"`, not `"012"`).
fn canonical_index(k: &str) -> Option<u64> {
    let index = k.parse::<u64>().ok()?;
    if index.to_string() == k {
        Some(index)
    } else {
        None
    }
}

fn objects_to_lists(value: &mut Value) {
    if let Value::Object(members) = value {
        for child in members.values_mut() {
            objects_to_lists(child);
        }

        let is_list = members.keys().enumerate().all(|(i, k)| canonical_index(k) == Some(i as u64));
        if is_list {
            let items = std::mem::take(members).into_iter().map(|(_, v)| v).collect();
            *value = Value::Array(items);
        }
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type.ends_with("/json") || content_type.ends_with("+json")
}

/// Get the content type (lowercased) and character set used in the body.
fn get_content_type_and_charset(headers: &HeaderMap<HeaderValue>) -> Option<ContentTypeCharset> {
    let value = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mut parts = value.split(';').map(str::trim);
    let content_type = parts.next().unwrap_or("").to_ascii_lowercase();

    for option in parts {
        if let Some((name, charset)) = option.split_once('=') {
            if name.trim().eq_ignore_ascii_case(CHARSET) {
                return Some(ContentTypeCharset {
                    content_type,
                    charset: Some(charset.trim().trim_matches('"').to_string()),
                });
            }
        }
    }

    Some(ContentTypeCharset {
        content_type,
        charset: None,
    })
}
