//! Format negotiation for the serving path.
//!
//! The client's capability signal is an `Accept`-style header. A format is
//! eligible only when it is enabled in settings and the signal names its
//! MIME type exactly (or via `image/*` / `*/*`). Matching is token-anchored:
//! `image/webp2` must not match `image/webp`.

use crate::converter::ImageFormat;

/// Splits an Accept-style header into media-range tokens, dropping
/// parameters such as `;q=0.8`.
fn tokens(accept: &str) -> impl Iterator<Item = &str> {
    accept
        .split(',')
        .map(|part| part.split(';').next().unwrap_or("").trim())
        .filter(|token| !token.is_empty())
}

/// Whether the capability signal accepts the given MIME type.
pub fn accepts(accept: &str, mime: &str) -> bool {
    tokens(accept).any(|token| {
        token.eq_ignore_ascii_case(mime)
            || token.eq_ignore_ascii_case("image/*")
            || token == "*/*"
    })
}

/// Picks the best modern format the client supports.
///
/// Preference is fixed: AVIF before WebP. Returns `None` when no enabled
/// format matches, in which case the caller falls through to the original.
pub fn select_format(accept: &str, enabled: &[ImageFormat]) -> Option<ImageFormat> {
    ImageFormat::preference_order()
        .iter()
        .copied()
        .find(|format| enabled.contains(format) && accepts(accept, format.mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: &[ImageFormat] = &[ImageFormat::Webp, ImageFormat::Avif];

    #[test]
    fn test_avif_preferred_when_both_accepted() {
        let accept = "image/avif,image/webp,image/apng,*/*;q=0.8";
        assert_eq!(select_format(accept, BOTH), Some(ImageFormat::Avif));
    }

    #[test]
    fn test_webp_when_avif_not_accepted_explicitly() {
        // No wildcard: only webp is named.
        let accept = "image/webp,image/png;q=0.9";
        assert_eq!(
            select_format(accept, &[ImageFormat::Webp]),
            Some(ImageFormat::Webp)
        );
    }

    #[test]
    fn test_disabled_format_never_selected() {
        let accept = "image/avif,image/webp";
        assert_eq!(
            select_format(accept, &[ImageFormat::Webp]),
            Some(ImageFormat::Webp)
        );
        assert_eq!(select_format(accept, &[]), None);
    }

    #[test]
    fn test_anchored_matching_rejects_lookalikes() {
        assert!(!accepts("image/webp2", "image/webp"));
        assert!(!accepts("ximage/webp", "image/webp"));
        assert!(accepts("image/webp", "image/webp"));
    }

    #[test]
    fn test_wildcards() {
        assert!(accepts("image/*", "image/avif"));
        assert!(accepts("*/*", "image/webp"));
        assert_eq!(select_format("*/*", BOTH), Some(ImageFormat::Avif));
    }

    #[test]
    fn test_parameters_and_whitespace_ignored() {
        assert!(accepts("text/html, image/webp ;q=0.9", "image/webp"));
    }

    #[test]
    fn test_no_match_falls_through() {
        assert_eq!(select_format("text/html,application/json", BOTH), None);
        assert_eq!(select_format("", BOTH), None);
    }

    #[test]
    fn test_case_insensitive_match() {
        assert!(accepts("Image/WebP", "image/webp"));
    }
}
