// src/exec/decode.rs

//! Output line decoding.
//!
//! Scripts on the bench machines print in whatever the local console uses.
//! Each raw line goes through a fallback chain: strict UTF-8, then the
//! regional GBK codepage, then lossy UTF-8 with replacement characters.

use encoding_rs::GBK;

/// Decode one raw output line (without trailing newline bytes).
pub fn decode_line(raw: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(raw) {
        return s.to_string();
    }

    let (decoded, had_errors) = GBK.decode_without_bom_handling(raw);
    if !had_errors {
        return decoded.into_owned();
    }

    String::from_utf8_lossy(raw).into_owned()
}

/// Strip a trailing `\n` / `\r\n` from a raw line buffer.
pub fn trim_line_ending(mut raw: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = raw {
        raw = rest;
    }
    if let [rest @ .., b'\r'] = raw {
        raw = rest;
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_is_taken_as_is() {
        assert_eq!(decode_line("测试 合格".as_bytes()), "测试 合格");
    }

    #[test]
    fn gbk_is_used_when_utf8_fails() {
        let (bytes, _, _) = GBK.encode("合格");
        assert!(std::str::from_utf8(&bytes).is_err());
        assert_eq!(decode_line(&bytes), "合格");
    }

    #[test]
    fn undecodable_bytes_fall_back_to_replacement() {
        let raw = [b'o', b'k', 0xff];
        let decoded = decode_line(&raw);
        assert!(decoded.starts_with("ok"));
        assert!(decoded.contains('\u{fffd}'));
    }

    #[test]
    fn line_endings_are_trimmed() {
        assert_eq!(trim_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc"), b"abc");
    }
}
