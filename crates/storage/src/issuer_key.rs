//! Trusted issuer public key record.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

/// Sub-second digits kept in `expiry`, matching what an `f64` epoch holds.
const EXPIRY_SUBSEC_DIGITS: u16 = 6;

/// Public key of a trusted token issuer.
///
/// The registry of these records decides which bearer tokens the service
/// accepts: a token is accepted only if its `iss` claim names a registered
/// issuer whose key has not expired and whose public key verifies the
/// token signature.
///
/// # Key material
///
/// `public_key` holds either a base64url (unpadded) raw Ed25519 public key,
/// or a PEM document (`-----BEGIN PUBLIC KEY-----`) for Ed25519 or RSA keys.
/// Parsing happens in the authentication layer; this crate only stores it.
///
/// # Expiry encoding
///
/// `expiry` is written as Unix seconds: an integer for whole seconds, a
/// fractional number otherwise. This is the format existing `PUBKEYS.json`
/// files use. When reading, RFC 3339 strings are accepted as well.
/// Precision is microseconds; the builder truncates anything finer.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use xdb_common_storage::IssuerKey;
///
/// let key = IssuerKey::builder()
///     .issuer("blackbook")
///     .public_key("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo")
///     .expiry(Utc::now() + Duration::days(30))
///     .build();
///
/// assert!(!key.is_expired());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct IssuerKey {
    /// Issuer identifier, matched against the token `iss` claim.
    #[builder(into)]
    pub issuer: String,

    /// Public key material (base64url raw Ed25519, or PEM).
    #[builder(into)]
    pub public_key: String,

    /// Instant after which the key is no longer trusted.
    #[serde(serialize_with = "serialize_expiry", deserialize_with = "deserialize_expiry")]
    #[builder(with = |expiry: DateTime<Utc>| expiry.trunc_subsecs(EXPIRY_SUBSEC_DIGITS))]
    pub expiry: DateTime<Utc>,
}

impl IssuerKey {
    /// Returns `true` if the key has expired at `now`.
    ///
    /// A key whose expiry equals `now` is already expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// Returns `true` if the key has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

fn serialize_expiry<S>(expiry: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let secs = expiry.timestamp();
    match expiry.timestamp_subsec_micros() {
        0 => serializer.serialize_i64(secs),
        micros => serializer.serialize_f64(secs as f64 + f64::from(micros) / 1e6),
    }
}

fn deserialize_expiry<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawExpiry {
        Seconds(i64),
        Fractional(f64),
        Text(String),
    }

    match RawExpiry::deserialize(deserializer)? {
        RawExpiry::Seconds(secs) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| D::Error::custom(format!("expiry out of range: {secs}"))),
        RawExpiry::Fractional(secs) => {
            if !secs.is_finite() {
                return Err(D::Error::custom("expiry must be a finite timestamp"));
            }
            let whole = secs.floor();
            let micros = ((secs - whole) * 1e6).round().min(999_999.0) as u32;
            DateTime::from_timestamp(whole as i64, micros * 1_000)
                .ok_or_else(|| D::Error::custom(format!("expiry out of range: {secs}")))
        },
        RawExpiry::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| D::Error::custom(format!("invalid expiry '{text}': {e}"))),
    }
}
