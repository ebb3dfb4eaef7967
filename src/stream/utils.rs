use base64::Engine;
use image::ImageFormat;
use serde_json::Value;

/// MIME type used when the image format cannot be sniffed
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Base64 characters decoded when sniffing the image format (multiple of 4)
const SNIFF_PREFIX_LEN: usize = 32;

/// Object keys holding raw base64 image data, in lookup order
const BASE64_KEYS: [&str; 2] = ["base64", "data"];

/// Object keys holding an already displayable source, in lookup order
const SOURCE_KEYS: [&str; 3] = ["url", "src", "dataUrl"];

/// Whether a string can be used as an image source without promotion
pub fn is_displayable_source(source: &str) -> bool {
    source.starts_with("data:")
        || source.starts_with("http://")
        || source.starts_with("https://")
        || source.starts_with('/')
        || source.starts_with("./")
        || source.starts_with("../")
}

/// Turn a screenshot value into something an `<img>`-style consumer can display.
///
/// Strings that are already data URIs or URLs pass through; anything else is
/// treated as raw base64 and promoted to a `data:` URI. Objects are searched
/// for `base64`, `data`, `url`, `src` and `dataUrl` in that order.
pub fn normalize_image_source(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_source_str(s),
        Value::Object(map) => {
            for key in BASE64_KEYS {
                if let Some(src) = map.get(key).and_then(Value::as_str).and_then(normalize_source_str) {
                    return Some(src);
                }
            }
            SOURCE_KEYS
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|s| !s.is_empty())
                .map(str::to_string)
        }
        _ => None,
    }
}

fn normalize_source_str(source: &str) -> Option<String> {
    let source = source.trim();
    if source.is_empty() {
        return None;
    }
    if is_displayable_source(source) {
        return Some(source.to_string());
    }
    Some(to_data_uri(source))
}

/// Promote raw base64 to a `data:` URI, sniffing the MIME type when possible
pub fn to_data_uri(base64_data: &str) -> String {
    format!("data:{};base64,{}", sniff_image_mime(base64_data), base64_data)
}

/// Guess the image MIME type from the leading bytes of base64 data
pub fn sniff_image_mime(base64_data: &str) -> &'static str {
    let cut = base64_data.len().min(SNIFF_PREFIX_LEN);
    let Some(prefix) = base64_data.get(..cut - cut % 4) else {
        return DEFAULT_IMAGE_MIME;
    };
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(prefix) else {
        return DEFAULT_IMAGE_MIME;
    };

    match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => DEFAULT_IMAGE_MIME,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_base64_promoted_to_png() {
        assert_eq!(
            normalize_image_source(&json!("QUJD")),
            Some("data:image/png;base64,QUJD".to_string())
        );
    }

    #[test]
    fn test_urls_pass_through() {
        for src in ["data:image/jpeg;base64,xyz", "https://cdn/x.png", "/shots/1.png", "./a.png"] {
            assert_eq!(normalize_image_source(&json!(src)), Some(src.to_string()));
        }
    }

    #[test]
    fn test_object_prefers_base64_over_url() {
        let value = json!({"filename": "a.png", "url": "/shots/a.png", "base64": "QUJD"});
        assert_eq!(
            normalize_image_source(&value),
            Some("data:image/png;base64,QUJD".to_string())
        );
    }

    #[test]
    fn test_object_falls_back_to_url_keys() {
        assert_eq!(
            normalize_image_source(&json!({"url": "", "src": "/s.png"})),
            Some("/s.png".to_string())
        );
        assert_eq!(
            normalize_image_source(&json!({"dataUrl": "data:image/png;base64,AA=="})),
            Some("data:image/png;base64,AA==".to_string())
        );
    }

    #[test]
    fn test_unusable_values() {
        assert_eq!(normalize_image_source(&json!({})), None);
        assert_eq!(normalize_image_source(&json!("   ")), None);
        assert_eq!(normalize_image_source(&json!(42)), None);
        assert_eq!(normalize_image_source(&Value::Null), None);
    }

    #[test]
    fn test_sniff_jpeg() {
        // FF D8 FF E0 00 10 4A 46 49 46
        let jpeg = base64::engine::general_purpose::STANDARD
            .encode([0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0, 1]);
        assert_eq!(sniff_image_mime(&jpeg), "image/jpeg");
        assert!(to_data_uri(&jpeg).starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn test_sniff_png() {
        let png = base64::engine::general_purpose::STANDARD
            .encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D]);
        assert_eq!(sniff_image_mime(&png), "image/png");
    }

    #[test]
    fn test_sniff_garbage_defaults_to_png() {
        assert_eq!(sniff_image_mime("!!!!"), DEFAULT_IMAGE_MIME);
        assert_eq!(sniff_image_mime("QQ"), DEFAULT_IMAGE_MIME);
    }
}
