//! Fixed-width decimal field decoding for /proc pseudo-files.
//!
//! Kernel text fields are short, right-aligned and space-padded. This decoder
//! runs once per candidate process per cycle, so it never allocates and
//! always walks the same eight positions.

/// Width of the normalized field. Eight digits cover every pid the kernel
/// hands out and every `%8lu` column in /proc/meminfo.
pub const FIELD_WIDTH: usize = 8;

/// Decodes up to [`FIELD_WIDTH`] ASCII characters into an unsigned integer.
///
/// The text is right-aligned into an eight character field. Positions left
/// of the text count as `'0'`, and so does every space inside the text.
/// Any other character that is not an ASCII digit rejects the field, as does
/// text longer than eight bytes. An empty field decodes to 0.
pub fn parse_decimal_field(text: &[u8]) -> Option<u32> {
    if text.len() > FIELD_WIDTH {
        return None;
    }

    let mut field = [b'0'; FIELD_WIDTH];
    field[FIELD_WIDTH - text.len()..].copy_from_slice(text);

    let mut value = 0u32;
    let mut invalid = false;
    for &c in &field {
        let c = if c == b' ' { b'0' } else { c };
        invalid |= !c.is_ascii_digit();
        value = value * 10 + u32::from(c.wrapping_sub(b'0') % 10);
    }

    if invalid {
        None
    } else {
        Some(value)
    }
}

/// Decodes a /proc directory name as a process id.
///
/// Pid 0 is rejected: `kill(0, ..)` addresses the caller's own process group.
pub fn parse_pid(name: &[u8]) -> Option<u32> {
    parse_decimal_field(name).filter(|&pid| pid != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_field_examples() {
        assert_eq!(parse_decimal_field(b"0"), Some(0));
        assert_eq!(parse_decimal_field(b" 7"), Some(7));
        assert_eq!(parse_decimal_field(b"1234"), Some(1234));
        assert_eq!(parse_decimal_field(b"99999999"), Some(99_999_999));
        assert_eq!(parse_decimal_field(b""), Some(0));
    }

    #[test]
    fn test_parse_decimal_field_spaces_are_zero_digits() {
        assert_eq!(parse_decimal_field(b"   42"), Some(42));
        assert_eq!(parse_decimal_field(b"  765432"), Some(765_432));
        assert_eq!(parse_decimal_field(b"        "), Some(0));
        // Interior spaces are zero digits too.
        assert_eq!(parse_decimal_field(b"1 2"), Some(102));
    }

    #[test]
    fn test_parse_decimal_field_rejects_non_digits() {
        assert_eq!(parse_decimal_field(b"12a4"), None);
        assert_eq!(parse_decimal_field(b"-17"), None);
        assert_eq!(parse_decimal_field(b"200\n"), None);
        assert_eq!(parse_decimal_field(b"self"), None);
        assert_eq!(parse_decimal_field(b"."), None);
        assert_eq!(parse_decimal_field(b"\0\0\0\0\0\0\0\0"), None);
    }

    #[test]
    fn test_parse_decimal_field_rejects_long_text() {
        assert_eq!(parse_decimal_field(b"123456789"), None);
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid(b"1"), Some(1));
        assert_eq!(parse_pid(b"4194304"), Some(4_194_304));
        assert_eq!(parse_pid(b"0"), None);
        assert_eq!(parse_pid(b""), None);
        assert_eq!(parse_pid(b"thread-self"), None);
    }
}
