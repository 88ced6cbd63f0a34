//! Artifact naming: derive a per-job output filename from the target URL.

use url::Url;

const MAX_NAME_LEN: usize = 128;

/// Derives a `.json` artifact filename from the URL's last path segment.
///
/// Returns `None` for root or empty paths; the caller falls back to a
/// job-id-based name.
pub fn artifact_filename(url: &Url) -> Option<String> {
    let segment = url.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    let name = sanitize_segment(segment);
    if name.is_empty() {
        return None;
    }
    if name.ends_with(".json") {
        Some(name)
    } else {
        Some(format!("{name}.json"))
    }
}

/// Sanitizes a URL path segment for safe use as a filename: separators,
/// control characters, and whitespace become `_` (collapsed), leading and
/// trailing dots/underscores are trimmed, and length is capped.
pub fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut prev_underscore = false;
    for c in segment.chars() {
        let mapped = if c == '/' || c == '\\' || c == '\0' || c.is_control() || c.is_whitespace() {
            '_'
        } else {
            c
        };
        if mapped == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(mapped);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.len() > MAX_NAME_LEN {
        let mut take = MAX_NAME_LEN;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}
