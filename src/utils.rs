//! Utility functions.

/// Longest type name read from a string table.
pub const MAX_C_STRING: usize = 2048;

/// Returns true if the first `window` bytes of `data` are all zero.
///
/// A buffer shorter than `window` is judged on the bytes it has.
pub fn is_zero_window(data: &[u8], window: usize) -> bool {
    data.iter().take(window).all(|&b| b == 0)
}

/// Reads a NUL-terminated string of at most `max` bytes.
///
/// Returns an empty string when the first byte is NUL. Invalid UTF-8 is replaced lossily,
/// mangled names are plain ASCII anyway.
pub fn read_c_string(data: &[u8], max: usize) -> String {
    let window = &data[..data.len().min(max)];
    let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
    String::from_utf8_lossy(&window[..end]).into_owned()
}

/// Decodes an unsigned LEB128 value, returning it with the number of bytes consumed.
pub fn read_uleb128(data: &[u8]) -> Option<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        result |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

/// Decodes a signed LEB128 value, returning it with the number of bytes consumed.
pub fn read_sleb128(data: &[u8]) -> Option<(i64, usize)> {
    let mut result = 0i64;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        result |= i64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Some((result, i + 1));
        }
    }
    None
}
