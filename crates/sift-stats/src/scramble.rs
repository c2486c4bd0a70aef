//! Reversible byte scrambling applied to shard files on disk.
//!
//! This is deliberately not cryptography: it only discourages casual
//! hand-editing of statistics files. The transform is a self-inverse XOR
//! against a rolling key mixed with the byte position, so `scramble` is its
//! own inverse and corruption anywhere in the stream stays local.

const KEY: [u8; 16] = [
    0x5a, 0x3c, 0x96, 0xe1, 0x0f, 0x78, 0xb4, 0x2d, 0xc7, 0x19, 0x6b, 0x84, 0xf2, 0x41, 0xae, 0x53,
];

pub(crate) fn scramble(bytes: &mut [u8]) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= KEY[i % KEY.len()] ^ (i as u8).rotate_left(3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scramble_is_self_inverse() {
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut bytes = original.clone();
        scramble(&mut bytes);
        assert_ne!(bytes, original);
        scramble(&mut bytes);
        assert_eq!(bytes, original);
    }

    #[test]
    fn scramble_changes_repeated_bytes_differently() {
        let mut bytes = vec![0u8; 64];
        scramble(&mut bytes);
        // A run of identical input bytes must not scramble to a constant,
        // otherwise the obfuscation leaks structure trivially.
        assert!(bytes.windows(2).any(|w| w[0] != w[1]));
    }
}
