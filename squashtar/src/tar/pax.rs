//! Pax extended-header payload: a sequence of `LEN KEY=VALUE\n` lines, where
//! `LEN` is the decimal length of the whole line, itself included.

use std::collections::BTreeMap;

use crate::error::{Result, SquashTarError};

/// Parse a pax payload into an ordered key → value map (later keys in the
/// stream overwrite earlier ones, matching GNU tar's behaviour for repeated
/// keys other than the deliberately-repeated `GNU.sparse.offset`/`.numbytes`
/// pair, which callers collect separately before calling this).
pub fn decode(mut payload: &[u8]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    while !payload.is_empty() {
        let space = payload
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| SquashTarError::corrupted("pax record missing length/key separator"))?;
        let len_str = std::str::from_utf8(&payload[..space])
            .map_err(|e| SquashTarError::StrUtf8(e))?;
        let len: usize = len_str
            .trim()
            .parse()
            .map_err(|_| SquashTarError::corrupted("pax record length is not decimal"))?;
        if len == 0 || len > payload.len() {
            return Err(SquashTarError::corrupted("pax record length out of bounds"));
        }
        let record = &payload[..len];
        let rest = &record[space + 1..];
        let rest = rest.strip_suffix(b"\n").unwrap_or(rest);
        let eq = rest
            .iter()
            .position(|&b| b == b'=')
            .ok_or_else(|| SquashTarError::corrupted("pax record missing '='"))?;
        let key = String::from_utf8_lossy(&rest[..eq]).into_owned();
        let value = String::from_utf8_lossy(&rest[eq + 1..]).into_owned();
        map.insert(key, value);
        payload = &payload[len..];
    }
    Ok(map)
}

/// Encode `pairs` into pax payload bytes, resolving each line's
/// self-referential length iteratively (the length digit count can itself
/// push the total over a power of ten).
pub fn encode(pairs: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in pairs {
        let body_len = key.len() + 1 + value.len() + 1; // "key=value\n"
        let mut len = body_len + 2; // smallest plausible " N".len()
        loop {
            let candidate = len_digit_count(len) + 1 + body_len;
            if candidate == len {
                break;
            }
            len = candidate;
        }
        out.extend_from_slice(len.to_string().as_bytes());
        out.push(b' ');
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(b'\n');
    }
    out
}

fn len_digit_count(mut n: usize) -> usize {
    let mut digits = 1;
    n /= 10;
    while n > 0 {
        digits += 1;
        n /= 10;
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let pairs = vec![
            ("path".to_string(), "deeply/nested/very/long/path/name".to_string()),
            ("SCHILY.xattr.user.mime_type".to_string(), "blob/magic".to_string()),
        ];
        let encoded = encode(&pairs);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.get("path").unwrap(), &pairs[0].1);
        assert_eq!(decoded.get("SCHILY.xattr.user.mime_type").unwrap(), &pairs[1].1);
    }

    #[test]
    fn length_prefix_accounts_for_its_own_digits() {
        // "30 path=xxxxxxxxxxxxxxxxxxxxx\n" is exactly 30 bytes.
        let value = "x".repeat(21);
        let encoded = encode(&[("path".to_string(), value.clone())]);
        let line = std::str::from_utf8(&encoded).unwrap();
        let space = line.find(' ').unwrap();
        let claimed_len: usize = line[..space].parse().unwrap();
        assert_eq!(claimed_len, encoded.len());
    }
}
