//! Image URL derivation from product payloads.

use serde_json::Value;

use crate::extract::text;

/// CDN that serves upstream assets by ID.
pub const ASSET_CDN_BASE: &str = "https://amsprod.blob.core.windows.net/assets";

/// Hosts whose image URLs are known to fail and are never handed downstream.
const BLOCKED_HOSTS: &[&str] = &["igmetrix.net"];

const CDN_IMAGE_SIZE: u32 = 1200;
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Image URLs for a product, hero shot first, duplicates removed.
#[must_use]
pub fn asset_urls(raw: &Value) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let mut push = |url: String| {
        if is_blocked(&url) {
            tracing::debug!(url, "skipping image on blocked host");
        } else if !urls.contains(&url) {
            urls.push(url);
        }
    };

    if let Some(hero) = text(raw, "HeroShotUri") {
        push(hero);
    }

    if let Some(assets) = raw.get("Assets").and_then(Value::as_array) {
        for asset in assets.iter().filter(|asset| is_image(asset)) {
            if let Some(url) = asset_url(asset) {
                push(url);
            }
        }
    }

    urls
}

/// URL for one entry of a product's `Assets` array.
///
/// An explicit `Url` or `Uri` wins; an image extension is appended when it lacks one.
/// Otherwise the URL is built from the asset ID on the CDN.
fn asset_url(asset: &Value) -> Option<String> {
    let extension = text(asset, "FileExtension")
        .map(|ext| ext.trim_start_matches('.').to_owned())
        .unwrap_or_else(|| "jpg".to_owned());

    if let Some(uri) = text(asset, "Url").or_else(|| text(asset, "Uri")) {
        if has_image_extension(&uri) {
            return Some(uri);
        }
        let suffix = text(asset, "Name")
            .filter(|name| has_image_extension(name))
            .and_then(|name| name.rfind('.').map(|dot| name[dot..].to_owned()))
            .unwrap_or_else(|| format!(".{extension}"));
        return Some(format!("{uri}{suffix}"));
    }

    let asset_id = text(asset, "AssetId").or_else(|| text(asset, "Id"))?;
    Some(format!(
        "{ASSET_CDN_BASE}/{asset_id}_{CDN_IMAGE_SIZE}_{CDN_IMAGE_SIZE}.{extension}"
    ))
}

/// Assets without a `Type` are assumed to be images.
fn is_image(asset: &Value) -> bool {
    text(asset, "Type").map_or(true, |kind| kind.eq_ignore_ascii_case("image"))
}

fn has_image_extension(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

fn is_blocked(url: &str) -> bool {
    BLOCKED_HOSTS.iter().any(|host| url.contains(host))
}
