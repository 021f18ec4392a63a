// Mon Feb 2 2026 - Alex

/// Order-sensitive name hash shared by the writer's table construction and
/// the reader's probe. Each byte is offset by its index, rotated left by an
/// accumulating shift (step 7, wrapping at 32), and summed; the final
/// accumulator is offset by the string length. Writer and reader must
/// agree bit-for-bit or lookups miss silently instead of erroring.
pub fn name_hash(name: &str) -> u32 {
    let mut acc: u32 = 0;
    let mut shift: u32 = 0;
    for (i, byte) in name.bytes().enumerate() {
        let v = (byte as u32).wrapping_add(i as u32);
        acc = acc.wrapping_add(v.rotate_left(shift));
        shift += 7;
        if shift >= 32 {
            shift -= 32;
        }
    }
    acc.wrapping_add(name.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(name_hash("DataModel"), name_hash("DataModel"));
        assert_eq!(name_hash(""), 0);
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(name_hash("ab"), name_hash("ba"));
        assert_ne!(name_hash("abc"), name_hash("acb"));
    }

    #[test]
    fn test_hash_depends_on_length() {
        assert_ne!(name_hash("a"), name_hash("a\0"));
    }

    #[test]
    fn test_shift_wraps_past_32() {
        // 6 bytes push the shift past 32 (0,7,14,21,28,35->3).
        let h = name_hash("abcdef");
        assert_eq!(h, name_hash("abcdef"));
        assert_ne!(h, name_hash("abcdeg"));
    }
}
