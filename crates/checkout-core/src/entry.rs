//! Entry Link Decoding
//!
//! A checkout link carries its payment parameters either as individual query
//! parameters or as a single base64 JSON token in `t`. The strategy is picked
//! once per session by [`detect`].

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE, URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Query parameter holding the opaque token
pub const TOKEN_PARAM: &str = "t";

/// Which optional fields are mandatory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// `order_id`, `amount`, `key`
    #[default]
    Lenient,

    /// Additionally `phone` and `course_id`
    Strict,
}

/// Validated payment parameters of a checkout link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryParams {
    pub order_id: String,
    /// Minor currency units
    pub amount: u64,
    /// Public checkout key passed through to the widget
    pub key: String,
    pub phone: Option<String>,
    pub course: Option<String>,
    pub course_id: Option<String>,
    pub price: Option<String>,
    pub email: Option<String>,
}

/// Unvalidated fields as they appear in the link
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "amount_as_string")]
    pub amount: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub course: Option<String>,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens are produced by different senders; some write the amount as a number.
fn amount_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(u64),
        Text(String),
    }

    Ok(Option::<Amount>::deserialize(deserializer)?.map(|a| match a {
        Amount::Number(n) => n.to_string(),
        Amount::Text(s) => s,
    }))
}

impl RawEntry {
    /// Check required fields and parse the amount
    pub fn validate(self, strictness: Strictness) -> Result<EntryParams> {
        let order_id = required(self.order_id, "order_id")?;
        let amount_raw = required(self.amount, "amount")?;
        let key = required(self.key, "key")?;

        let amount = amount_raw.trim().parse::<u64>().map_err(|_| {
            CheckoutError::InvalidLink(format!("amount is not a whole number: {amount_raw}"))
        })?;

        let phone = non_empty(self.phone);
        let course_id = non_empty(self.course_id);

        if strictness == Strictness::Strict {
            if phone.is_none() {
                return Err(CheckoutError::InvalidLink("phone missing".into()));
            }
            if course_id.is_none() {
                return Err(CheckoutError::InvalidLink("course_id missing".into()));
            }
        }

        Ok(EntryParams {
            order_id,
            amount,
            key,
            phone,
            course: non_empty(self.course),
            course_id,
            price: non_empty(self.price),
            email: non_empty(self.email),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    non_empty(value).ok_or_else(|| CheckoutError::InvalidLink(format!("{name} missing")))
}

/// Strategy for reading link parameters
pub trait EntryDecoder: Send + Sync {
    /// Strategy name, for logs
    fn name(&self) -> &'static str;

    /// Extract the raw fields from the query
    fn decode(&self, query: &HashMap<String, String>) -> Result<RawEntry>;
}

/// Individual query parameters (`order_id`, `amount`, `key`, ...)
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineQuery;

impl EntryDecoder for InlineQuery {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn decode(&self, query: &HashMap<String, String>) -> Result<RawEntry> {
        let get = |name: &str| query.get(name).cloned();
        Ok(RawEntry {
            order_id: get("order_id"),
            amount: get("amount"),
            key: get("key"),
            phone: get("phone"),
            course: get("course"),
            course_id: get("course_id"),
            price: get("price"),
            email: get("email"),
        })
    }
}

/// Base64-encoded JSON object in the `t` parameter
#[derive(Clone, Copy, Debug, Default)]
pub struct OpaqueToken;

impl OpaqueToken {
    /// Decode a token value into raw fields
    pub fn decode_token(token: &str) -> Result<RawEntry> {
        // Form decoding turns '+' into ' '
        let token = token.trim().replace(' ', "+");

        let bytes = STANDARD
            .decode(&token)
            .or_else(|_| URL_SAFE.decode(&token))
            .or_else(|_| URL_SAFE_NO_PAD.decode(&token))
            .map_err(|e| CheckoutError::InvalidLink(format!("token is not base64: {e}")))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| CheckoutError::InvalidLink(format!("token is not valid JSON: {e}")))
    }
}

impl EntryDecoder for OpaqueToken {
    fn name(&self) -> &'static str {
        "token"
    }

    fn decode(&self, query: &HashMap<String, String>) -> Result<RawEntry> {
        let token = query
            .get(TOKEN_PARAM)
            .ok_or_else(|| CheckoutError::InvalidLink("token missing".into()))?;
        Self::decode_token(token)
    }
}

/// Pick the decoding strategy for a link: token when `t` is present
pub fn detect(query: &HashMap<String, String>) -> &'static dyn EntryDecoder {
    if query.contains_key(TOKEN_PARAM) {
        &OpaqueToken
    } else {
        &InlineQuery
    }
}

/// Decode and validate a link with the detected strategy
pub fn parse_entry(query: &HashMap<String, String>, strictness: Strictness) -> Result<EntryParams> {
    let decoder = detect(query);
    let params = decoder.decode(query)?.validate(strictness);

    match &params {
        Ok(p) => tracing::debug!(decoder = decoder.name(), order_id = %p.order_id, "Decoded checkout link"),
        Err(e) => tracing::warn!(decoder = decoder.name(), error = %e, "Rejected checkout link"),
    }

    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn full_inline() -> HashMap<String, String> {
        query(&[
            ("order_id", "order_1"),
            ("amount", "5000"),
            ("key", "rzp_test_abc"),
            ("phone", "+15550001"),
            ("course", "Rust 101"),
            ("course_id", "C1"),
            ("price", "50"),
            ("email", "a@b.com"),
        ])
    }

    #[test]
    fn test_inline_params() {
        let params = parse_entry(&full_inline(), Strictness::Strict).unwrap();
        assert_eq!(params.order_id, "order_1");
        assert_eq!(params.amount, 5000);
        assert_eq!(params.course.as_deref(), Some("Rust 101"));
    }

    #[test]
    fn test_token_matches_inline() {
        let json = serde_json::json!({
            "order_id": "order_1",
            "amount": 5000,
            "key": "rzp_test_abc",
            "phone": "+15550001",
            "course": "Rust 101",
            "course_id": "C1",
            "price": "50",
            "email": "a@b.com",
        });
        let token = STANDARD.encode(json.to_string());
        let from_token = parse_entry(&query(&[("t", &token)]), Strictness::Strict).unwrap();
        let from_inline = parse_entry(&full_inline(), Strictness::Strict).unwrap();
        assert_eq!(from_token, from_inline);
    }

    #[test]
    fn test_token_with_spaces_for_plus() {
        // "??>" lands on a 3-byte boundary and encodes to "Pz8+"
        let json = r#"{ "order_id": "??>","amount":"1","key":"k"}"#;
        let token = STANDARD.encode(json);
        assert!(token.contains('+'));
        let token = token.replace('+', " ");
        let params = parse_entry(&query(&[("t", &token)]), Strictness::Lenient).unwrap();
        assert_eq!(params.order_id, "??>");
    }

    #[test]
    fn test_missing_required_fields() {
        for missing in ["order_id", "amount", "key"] {
            let mut q = full_inline();
            q.remove(missing);
            let err = parse_entry(&q, Strictness::Lenient).unwrap_err();
            assert!(matches!(err, CheckoutError::InvalidLink(_)), "{missing}");
        }
    }

    #[test]
    fn test_strict_requires_phone_and_course() {
        let mut q = full_inline();
        q.remove("phone");
        assert!(parse_entry(&q, Strictness::Lenient).is_ok());
        assert!(parse_entry(&q, Strictness::Strict).is_err());

        let mut q = full_inline();
        q.insert("course_id".into(), String::new());
        assert!(parse_entry(&q, Strictness::Strict).is_err());
    }

    #[test]
    fn test_bad_amount_and_token() {
        let mut q = full_inline();
        q.insert("amount".into(), "12.5".into());
        assert!(parse_entry(&q, Strictness::Lenient).is_err());

        let bad = query(&[("t", "%%%not-base64%%%")]);
        assert!(parse_entry(&bad, Strictness::Lenient).is_err());

        let not_json = query(&[("t", &STANDARD.encode("hello"))]);
        assert!(parse_entry(&not_json, Strictness::Lenient).is_err());
    }

    #[test]
    fn test_detect() {
        assert_eq!(detect(&query(&[("t", "x")])).name(), "token");
        assert_eq!(detect(&full_inline()).name(), "inline");
    }
}
