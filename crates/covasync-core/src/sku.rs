//! Merchant SKU extraction from loosely-typed upstream product payloads.
//!
//! Upstream accounts expose the merchant SKU under several field names, and
//! some of them carry internal numeric or GUID identifiers in the same
//! fields. [`extract_sku`] walks an ordered candidate list, rejects values
//! that look like internal IDs, and synthesizes `COVA-<product id>` when
//! nothing usable remains.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Prefix for SKUs synthesized from the upstream product ID.
pub const FALLBACK_SKU_PREFIX: &str = "COVA-";

/// Direct field names tried in order, top level first.
pub const SKU_FIELDS: &[&str] = &[
    "SKU",
    "Sku",
    "sku",
    "CatalogSku",
    "catalogSku",
    "ItemLookupCode",
];

/// Leading digits of upstream-internal numeric identifiers.
const INTERNAL_ID_PREFIXES: &[&str] = &["100"];
const INTERNAL_ID_MIN_DIGITS: usize = 6;

static GUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{?[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\}?$")
        .expect("GUID pattern is valid")
});

static SKU_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{5,12}$").expect("SKU token pattern is valid"));

/// Where the chosen SKU came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuSource {
    /// A named top-level field.
    Field(&'static str),
    /// A `Skus[].Value` entry.
    SkusArray,
    /// A named field found below the top level.
    NestedField(&'static str),
    /// A top-level string field whose value looks like a SKU token.
    Scan(String),
    /// Synthesized from the product ID.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkuChoice {
    pub sku: String,
    pub source: SkuSource,
}

impl SkuChoice {
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.source == SkuSource::Fallback
    }
}

/// `true` for an all-digit value of at least six digits starting with an
/// internal-ID prefix, or any GUID-shaped value.
#[must_use]
pub fn is_internal_id(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if GUID_RE.is_match(candidate) {
        return true;
    }
    is_numeric(candidate)
        && candidate.len() >= INTERNAL_ID_MIN_DIGITS
        && INTERNAL_ID_PREFIXES
            .iter()
            .any(|prefix| candidate.starts_with(prefix))
}

/// `true` when a downstream SKU is missing, synthesized, or an internal ID.
#[must_use]
pub fn needs_sku_repair(current: Option<&str>) -> bool {
    match current.map(str::trim) {
        None | Some("") => true,
        Some(sku) => sku.starts_with(FALLBACK_SKU_PREFIX) || is_internal_id(sku),
    }
}

#[must_use]
pub fn fallback_sku(product_id: &str) -> String {
    format!("{FALLBACK_SKU_PREFIX}{product_id}")
}

/// Choose the merchant SKU for a raw upstream product.
///
/// Never fails: when no acceptable candidate exists the SKU is synthesized
/// from `product_id` and the choice is logged as a data-quality condition.
#[must_use]
pub fn extract_sku(raw: &Value, product_id: &str) -> SkuChoice {
    if let Some(choice) = from_named_fields(raw)
        .or_else(|| from_skus_array(raw))
        .or_else(|| from_nested_fields(raw))
        .or_else(|| from_token_scan(raw))
    {
        return choice;
    }

    tracing::warn!(
        product_id,
        "no merchant SKU in upstream payload; synthesizing fallback"
    );
    SkuChoice {
        sku: fallback_sku(product_id),
        source: SkuSource::Fallback,
    }
}

fn from_named_fields(raw: &Value) -> Option<SkuChoice> {
    SKU_FIELDS.iter().find_map(|field| {
        acceptable(raw.get(*field)).map(|sku| SkuChoice {
            sku,
            source: SkuSource::Field(field),
        })
    })
}

fn from_skus_array(raw: &Value) -> Option<SkuChoice> {
    raw.get("Skus")?
        .as_array()?
        .iter()
        .find_map(|entry| acceptable(entry.get("Value")))
        .map(|sku| SkuChoice {
            sku,
            source: SkuSource::SkusArray,
        })
}

fn from_nested_fields(raw: &Value) -> Option<SkuChoice> {
    let children: Vec<&Value> = match raw {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => return None,
    };

    children.into_iter().find_map(|child| {
        SKU_FIELDS
            .iter()
            .find_map(|field| {
                acceptable(child.get(*field)).map(|sku| SkuChoice {
                    sku,
                    source: SkuSource::NestedField(field),
                })
            })
            .or_else(|| from_nested_fields(child))
    })
}

/// Walks top-level fields in payload order; the first token-shaped value wins.
fn from_token_scan(raw: &Value) -> Option<SkuChoice> {
    raw.as_object()?.iter().find_map(|(key, value)| {
        let text = value.as_str()?.trim();
        (SKU_TOKEN_RE.is_match(text) && !is_numeric(text)).then(|| SkuChoice {
            sku: text.to_string(),
            source: SkuSource::Scan(key.clone()),
        })
    })
}

fn acceptable(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty() && !is_internal_id(&text)).then_some(text)
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
