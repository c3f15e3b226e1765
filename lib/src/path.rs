use crate::error::{BridgeError, Result};

/// Encode path with compact encoding
/// First nibble contains: odd_flag (bit 0) and leaf_flag (bit 1)
pub fn encode_path(nibbles: &[u8], is_leaf: bool) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(nibbles.len() / 2 + 1);
    let odd_len = nibbles.len() % 2 == 1;

    // Prefix encoding:
    // 0x0: extension, even length
    // 0x1: extension, odd length
    // 0x2: leaf, even length
    // 0x3: leaf, odd length
    let prefix = (u8::from(is_leaf) << 1) | u8::from(odd_len);

    let rest = if odd_len {
        encoded.push((prefix << 4) | nibbles[0]);
        &nibbles[1..]
    } else {
        encoded.push(prefix << 4);
        nibbles
    };
    for pair in rest.chunks_exact(2) {
        encoded.push((pair[0] << 4) | pair[1]);
    }

    encoded
}

/// Decode compact-encoded path
/// Returns (nibbles, is_leaf)
pub fn decode_path(encoded: &[u8]) -> Result<(Vec<u8>, bool)> {
    let Some(&first) = encoded.first() else {
        return Err(BridgeError::Malformed("empty compact path".into()));
    };

    let prefix = first >> 4;
    if prefix > 0x3 {
        return Err(BridgeError::Malformed(format!(
            "invalid compact path flag {prefix:#x}"
        )));
    }
    let is_leaf = (prefix & 0x2) != 0;
    let odd_len = (prefix & 0x1) != 0;

    let mut nibbles = Vec::with_capacity(encoded.len() * 2);
    if odd_len {
        nibbles.push(first & 0x0F);
    } else if first & 0x0F != 0 {
        return Err(BridgeError::Malformed("non-zero padding in compact path".into()));
    }
    nibbles.extend(to_nibbles(&encoded[1..]));

    Ok((nibbles, is_leaf))
}

/// Convert bytes to nibbles (hex digits)
pub fn to_nibbles(data: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }
    nibbles
}

/// Trie key of the item at `index` in a transaction or receipt list: `rlp(index)`
pub fn index_key(index: usize) -> Vec<u8> {
    rlp::encode(&(index as u64)).to_vec()
}

/// Helper function to find common prefix length
pub(crate) fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_path_leaf_odd() {
        let nibbles = vec![1, 2, 3, 4, 5];
        let encoded = encode_path(&nibbles, true);
        assert_eq!(encoded, vec![0x31, 0x23, 0x45]);
        let (decoded, is_leaf) = decode_path(&encoded).unwrap();

        assert_eq!(nibbles, decoded);
        assert!(is_leaf);
    }

    #[test]
    fn test_encode_decode_path_leaf_even() {
        let nibbles = vec![1, 2, 3, 4];
        let encoded = encode_path(&nibbles, true);
        assert_eq!(encoded, vec![0x20, 0x12, 0x34]);
        let (decoded, is_leaf) = decode_path(&encoded).unwrap();

        assert_eq!(nibbles, decoded);
        assert!(is_leaf);
    }

    #[test]
    fn test_encode_decode_path_extension_odd() {
        let nibbles = vec![1, 2, 3];
        let encoded = encode_path(&nibbles, false);
        let (decoded, is_leaf) = decode_path(&encoded).unwrap();

        assert_eq!(nibbles, decoded);
        assert!(!is_leaf);
    }

    #[test]
    fn test_decode_path_rejects_bad_flags() {
        assert!(decode_path(&[]).is_err());
        assert!(decode_path(&[0x41]).is_err());
        assert!(decode_path(&[0x25]).is_err());
    }

    #[test]
    fn test_to_nibbles() {
        let data = vec![0x12, 0x34, 0xab];
        let nibbles = to_nibbles(&data);
        assert_eq!(nibbles, vec![1, 2, 3, 4, 10, 11]);
    }

    #[test]
    fn test_index_key() {
        assert_eq!(index_key(0), vec![0x80]);
        assert_eq!(index_key(1), vec![0x01]);
        assert_eq!(index_key(0x13), vec![0x13]);
        assert_eq!(index_key(127), vec![0x7f]);
        assert_eq!(index_key(128), vec![0x81, 0x80]);
        assert_eq!(index_key(256), vec![0x82, 0x01, 0x00]);
    }
}
