//! Key encoding for request paths

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters that would change how a key in `/v1/:key` is routed or parsed
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Encode a key as a single URL path segment.
pub fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

/// Path of a key on the REST API.
pub fn key_path(key: &str) -> String {
    format!("/v1/{}", encode_key(key))
}
