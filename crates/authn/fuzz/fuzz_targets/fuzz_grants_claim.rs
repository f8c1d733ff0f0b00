//! Fuzz target for `grants` claim decoding.
//!
//! Arbitrary JSON is deserialized as a grants claim and decoded into grant
//! specs, exercising both the compact string and the structured list forms.

#![no_main]

use libfuzzer_sys::fuzz_target;
use xdb_common_authn::{GrantsClaim, Interface};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Compact form straight from the raw text.
        if let Ok(specs) = GrantsClaim::Encoded(text.to_owned()).specs() {
            for spec in specs {
                assert!(!spec.origin.is_empty());
                assert!(Interface::ALL.contains(&spec.access));
            }
        }
    }

    if let Ok(claim) = serde_json::from_slice::<GrantsClaim>(data) {
        let _ = claim.specs();
    }
});
