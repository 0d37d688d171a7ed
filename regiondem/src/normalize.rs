//! Region-name normalization and matching.
//!
//! Catalog names arrive with inconsistent accents, casing and occasionally
//! mangled encodings (`SAN JOAQUÃ\u{8d}N`). Every comparison goes through
//! [`normalize_name`] first.

use std::sync::OnceLock;

use encoding_rs::WINDOWS_1252;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Minimum similarity for a fuzzy name match.
pub const FUZZY_CUTOFF: f64 = 0.75;

/// Canonical comparison form of a region name.
///
/// 1. Encoding repair: UTF-8 mojibake is undone, and stray C1 controls from a
///    Latin-1 read are re-decoded as Windows-1252.
/// 2. NFKD decomposition with combining marks removed.
/// 3. Anything outside printable ASCII (32..=126) is dropped.
/// 4. Upper-cased and trimmed.
///
/// ```
/// use regiondem::normalize_name;
///
/// assert_eq!(normalize_name("  Ñuñoa "), "NUNOA");
/// assert_eq!(normalize_name("San Joaquín"), "SAN JOAQUIN");
/// ```
pub fn normalize_name(text: &str) -> String {
    let repaired = repair_encoding(text);
    repaired
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| (' '..='~').contains(c))
        .collect::<String>()
        .to_uppercase()
        .trim()
        .to_string()
}

fn repair_encoding(text: &str) -> String {
    // UTF-8 that was decoded as Windows-1252 round-trips back to valid UTF-8.
    if !text.is_ascii() {
        let (encoded, _, unmappable) = WINDOWS_1252.encode(text);
        if !unmappable {
            if let Ok(utf8) = std::str::from_utf8(&encoded) {
                return utf8.to_string();
            }
        }
    }

    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        let code = c as u32;
        if code > 0xFF {
            return text.to_string();
        }
        bytes.push(code as u8);
    }
    let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);
    decoded.into_owned()
}

/// Closest candidate to `target` with similarity at least [`FUZZY_CUTOFF`].
///
/// Both sides are expected to be normalized already. Ties keep the first candidate.
pub fn closest_match<'a, I>(target: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let score = strsim::normalized_levenshtein(target, candidate);
        if score < FUZZY_CUTOFF {
            continue;
        }
        match best {
            Some((_, s)) if s >= score => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(c, _)| c)
}

/// Cut off command-line flags that were pasted into a region name by mistake.
///
/// `"Ñuñoa --sources srtm"` becomes `"Ñuñoa"`. Surrounding quotes are stripped.
pub fn sanitize_region_name(raw: &str) -> String {
    static FLAG: OnceLock<Option<Regex>> = OnceLock::new();
    let flag = FLAG.get_or_init(|| Regex::new(r"(^|\s)--[A-Za-z]").ok());

    let trimmed = raw.trim();
    let head = match flag.as_ref().and_then(|re| re.find(trimmed)) {
        Some(m) => {
            tracing::warn!(
                raw = trimmed,
                "Embedded flag found in region name, truncating"
            );
            &trimmed[..m.start()]
        }
        None => trimmed,
    };
    head.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_accents_and_case() {
        assert_eq!(normalize_name("Ñuñoa"), "NUNOA");
        assert_eq!(normalize_name("Peñalolén"), "PENALOLEN");
        assert_eq!(normalize_name("  maipú  "), "MAIPU");
        assert_eq!(normalize_name("CONCÓN"), "CONCON");
    }

    #[test]
    fn test_repairs_mojibake() {
        // UTF-8 bytes of "Ñ" read as Latin-1
        assert_eq!(normalize_name("Ã‘uÃ±oa"), "NUNOA");
        assert_eq!(normalize_name("San JoaquÃ\u{AD}n"), "SAN JOAQUIN");
    }

    #[test]
    fn test_drops_control_characters() {
        assert_eq!(normalize_name("SAN JOAQUA\u{8d}N"), "SAN JOAQUAN");
        assert_eq!(normalize_name("LA\tREINA"), "LAREINA");
    }

    #[test]
    fn test_non_latin_input_is_not_reinterpreted() {
        // Contains a char above U+00FF; no repair attempt, accents still stripped.
        assert_eq!(normalize_name("Ñuñoa €"), "NUNOA");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for name in ["Ñuñoa", "Peñalolén", "San Joaquín", "O'Higgins"] {
            let once = normalize_name(name);
            assert_eq!(normalize_name(&once), once);
        }
    }

    #[test]
    fn test_closest_match() {
        let names = ["PENALOLEN", "NUNOA", "LA REINA", "MACUL"];
        assert_eq!(closest_match("NUNOA", names), Some("NUNOA"));
        assert_eq!(closest_match("PENALOLEN.", names), Some("PENALOLEN"));
        assert_eq!(closest_match("LAREINA", names), Some("LA REINA"));
        assert_eq!(closest_match("VALPARAISO", names), None);
    }

    #[test]
    fn test_sanitize_region_name() {
        assert_eq!(sanitize_region_name("Ñuñoa --sources srtm"), "Ñuñoa");
        assert_eq!(sanitize_region_name("\"La Reina --debug\""), "La Reina");
        assert_eq!(sanitize_region_name("  Maipú "), "Maipú");
        assert_eq!(sanitize_region_name("Estación Central"), "Estación Central");
    }
}
