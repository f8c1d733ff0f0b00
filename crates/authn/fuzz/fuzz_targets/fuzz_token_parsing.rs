//! Fuzz target for two-phase token parsing.
//!
//! Feeds arbitrary byte strings as bearer tokens through the untrusted peek
//! and the trusted verification. Every result must be either `Ok(...)` or
//! `Err(AuthError)`, never a panic.

#![no_main]

use chrono::{Duration, Utc};
use libfuzzer_sys::fuzz_target;
use xdb_common_authn::jwt::{decode_jwt_header, peek_issuer, verify_token};
use xdb_common_storage::IssuerKey;

fuzz_target!(|data: &[u8]| {
    // JWT tokens are always UTF-8 strings
    let Ok(token) = std::str::from_utf8(data) else {
        return;
    };

    let _ = decode_jwt_header(token);

    let Ok(peeked) = peek_issuer(token) else {
        return;
    };

    // Verify against a fixed, well-formed key named after the peeked issuer.
    let key = IssuerKey::builder()
        .issuer(peeked.as_str())
        .public_key("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo")
        .expiry(Utc::now() + Duration::days(1))
        .build();

    if let Ok(claims) = verify_token(token, &key, std::time::Duration::from_secs(60)) {
        let _ = claims.grants();
        let _ = claims.command();
    }
});
