//! Small, self-contained helpers shared by several components: the block
//! processor's dedup hash, the xattr-map-file value codecs, a filename
//! sanitizer, and a path canonicalizer.
//!
//! Fast hashing and growable arrays use the ecosystem's usual tools
//! (`rustc_hash::FxHashMap`, `solana_nohash_hasher`, `Vec`) rather than a
//! hand-rolled open-addressing table or dynamic array; see `DESIGN.md`.

use crate::error::{Result, SquashTarError};

/// xxhash32 of `data`, seed 0. Used by the block processor to key the
/// per-block dedup map (spec-mandated width; the 32-bit variant, not 64).
pub fn xxhash32(data: &[u8]) -> u32 {
    xxhash_rust::xxh32::xxh32(data, 0)
}

/// Hex-decode a `0x`-prefixed (or bare) string, as used by xattr-map-file
/// values (`setfattr` hex quoting).
pub fn hex_decode(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| SquashTarError::Corrupted(format!("invalid hex value: {e}")))
}

pub fn hex_encode(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Base64-decode a `0s`-prefixed (or bare) string, as used by xattr-map-file
/// values (`setfattr` base64 quoting). Accepts both standard `=` and
/// url-safe `_` padding alphabets, per the spec's testable property.
pub fn base64_decode(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0s").unwrap_or(s);
    if s.contains('_') || s.contains('-') {
        base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE, s)
    } else {
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
    }
    .map_err(|e| SquashTarError::Corrupted(format!("invalid base64 value: {e}")))
}

pub fn base64_encode(data: &[u8]) -> String {
    use base64::Engine;
    format!("0s{}", base64::engine::general_purpose::STANDARD.encode(data))
}

/// Names reserved on Windows (case-insensitively, with or without an
/// extension): `CON`, `PRN`, `AUX`, `NUL`, `COM1`..`COM9`, `LPT1`..`LPT9`.
const WINDOWS_RESERVED: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Returns true if `name` (a single path component, not a full path) would
/// collide with a Windows-reserved device name.
pub fn is_windows_reserved_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    WINDOWS_RESERVED.iter().any(|r| stem.eq_ignore_ascii_case(r))
}

/// Sanitizes a single path component for cross-platform archive output:
/// replaces characters illegal on Windows (`< > : " | ? * \`) with `_`, and
/// appends `_` to Windows-reserved names. Leaves the byte length unchanged
/// except for the reserved-name suffix.
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if "<>:\"|?*\\".contains(c) { '_' } else { c })
        .collect();
    if is_windows_reserved_name(&out) {
        out.push('_');
    }
    out
}

/// Collapses repeated `/`, removes `./` components, and rejects `..` and a
/// leading or trailing `/` by stripping them. Idempotent:
/// `canonicalize(canonicalize(p)) == canonicalize(p)`.
pub fn canonicalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                return Err(SquashTarError::Unsupported(format!(
                    "path escapes root via '..': {path}"
                )))
            }
            c => parts.push(c),
        }
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xxhash32_vectors() {
        assert_eq!(xxhash32(b"\x9e"), 0xB85C_BEE5);
        let vec_101: Vec<u8> = (0..101u32).map(|i| i as u8).collect();
        assert_eq!(xxhash32(&vec_101), 0x018F_52BC);
    }

    #[test]
    fn canonicalize_idempotent() {
        for p in ["a//b/./c/", "/a/b/c", "a/b/c", ""] {
            let once = canonicalize(p).unwrap();
            let twice = canonicalize(&once).unwrap();
            assert_eq!(once, twice);
            assert!(!once.contains("./"));
            assert!(!once.contains("//"));
            assert!(once.is_empty() || !once.ends_with('/'));
        }
    }

    #[test]
    fn canonicalize_rejects_dotdot() {
        assert!(canonicalize("a/../b").is_err());
    }

    #[test]
    fn base64_round_trip_both_alphabets() {
        let data = b"hello world, this is xattr payload data";
        let standard = base64_encode(data);
        assert_eq!(base64_decode(&standard).unwrap(), data);

        use base64::Engine;
        let url_safe = format!(
            "0s{}",
            base64::engine::general_purpose::URL_SAFE.encode(data)
        );
        assert_eq!(base64_decode(&url_safe).unwrap(), data);
    }

    #[test]
    fn hex_round_trip() {
        let data = [0xde, 0xad, 0xbe, 0xef];
        let encoded = hex_encode(&data);
        assert_eq!(hex_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn windows_reserved_names() {
        assert!(is_windows_reserved_name("con"));
        assert!(is_windows_reserved_name("COM3"));
        assert!(is_windows_reserved_name("nul.txt"));
        assert!(!is_windows_reserved_name("console"));
    }
}
