//! Share codes
//!
//! A session is joined with an 8-character alphanumeric code, shown as two
//! groups of four (`AB3D EF9K`). Users may type it with or without the space
//! and in any case; everything funnels through [`normalize_code`].

use rand::Rng;

pub const CODE_LEN: usize = 8;
const GROUP_LEN: usize = 4;

/// Uppercase letters and digits
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a fresh canonical (unspaced, uppercase) code.
///
/// 36^8 combinations; collisions are rare enough not to be prevented.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Canonicalize user input: strip whitespace, uppercase.
///
/// Returns `None` when the result cannot be a valid code.
pub fn normalize_code(input: &str) -> Option<String> {
    let code: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if code.len() == CODE_LEN && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(code)
    } else {
        None
    }
}

/// Display form: two groups of four separated by a space
pub fn format_code(code: &str) -> String {
    match normalize_code(code) {
        Some(canonical) => format!("{} {}", &canonical[..GROUP_LEN], &canonical[GROUP_LEN..]),
        None => code.to_string(),
    }
}

/// Shareable link embedding the unspaced code
pub fn join_url(base_url: &str, code: &str) -> String {
    let canonical = normalize_code(code).unwrap_or_else(|| code.to_string());
    format!(
        "{}?code={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&canonical)
    )
}

/// Extract the code from a join link
pub fn code_from_join_url(url: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "code")
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .and_then(|value| normalize_code(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_is_canonical() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert_eq!(normalize_code(&code).as_deref(), Some(code.as_str()));
        }
    }

    #[test]
    fn test_normalize_variants() {
        let expected = Some("AB3DEF9K".to_string());
        assert_eq!(normalize_code("AB3D EF9K"), expected);
        assert_eq!(normalize_code("ab3def9k"), expected);
        assert_eq!(normalize_code("  ab3d  ef9K "), expected);
        assert_eq!(normalize_code("Ab3D\tef9k"), expected);
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        assert_eq!(normalize_code("AB3D EF9"), None);
        assert_eq!(normalize_code("AB3D-EF9K"), None);
        assert_eq!(normalize_code(""), None);
    }

    #[test]
    fn test_format_code() {
        assert_eq!(format_code("ab3def9k"), "AB3D EF9K");
    }

    #[test]
    fn test_join_url_roundtrip() {
        let url = join_url("https://slidecast.app/join/", "AB3D EF9K");
        assert_eq!(url, "https://slidecast.app/join?code=AB3DEF9K");
        assert_eq!(code_from_join_url(&url).as_deref(), Some("AB3DEF9K"));
        assert_eq!(code_from_join_url("https://slidecast.app/join"), None);
    }
}
