//! 从密钥区块还原密钥流密钥。

use crate::{
    error::FormatError,
    ncm::crypto::{CORE_KEY, KEY_BOX_XOR, KEY_PREFIX, aes_ecb_decrypt, aes_ecb_encrypt, xor_bytes},
};

/// 逆转密钥区块的混淆，得到用于初始化密钥流的原始密钥。
///
/// 流程：逐字节异或 `0x64`，AES-128-ECB 解密，再去掉 `neteasecloudmusic` 头部。
/// 相同的输入总是得到相同的输出。
///
/// # 错误
///
/// 解密失败、头部不匹配或剩余密钥为空时返回 `FormatError::KeyDerivationFailed`。
pub fn derive_key(key_box: &[u8]) -> Result<Vec<u8>, FormatError> {
    let obfuscated = xor_bytes(key_box, KEY_BOX_XOR);
    let decrypted =
        aes_ecb_decrypt(&obfuscated, &CORE_KEY).map_err(FormatError::KeyDerivationFailed)?;

    let key = decrypted.strip_prefix(KEY_PREFIX).ok_or_else(|| {
        FormatError::KeyDerivationFailed("解密结果缺少 neteasecloudmusic 头部".into())
    })?;

    if key.is_empty() {
        return Err(FormatError::KeyDerivationFailed("密钥长度为 0".into()));
    }

    Ok(key.to_vec())
}

/// [`derive_key`] 的逆操作，用于重新封装容器。
pub fn encode_key_box(key: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut plaintext = Vec::with_capacity(KEY_PREFIX.len() + key.len());
    plaintext.extend_from_slice(KEY_PREFIX);
    plaintext.extend_from_slice(key);

    let encrypted = aes_ecb_encrypt(&plaintext, &CORE_KEY)
        .map_err(FormatError::KeyDerivationFailed)?;
    Ok(xor_bytes(&encrypted, KEY_BOX_XOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_KEY: &[u8; 16] = b"3214176488851E7f";

    #[test]
    fn test_derive_known_key() {
        let key_box = encode_key_box(KNOWN_KEY).unwrap();
        assert_eq!(key_box.len(), 48);
        assert_eq!(derive_key(&key_box).unwrap(), KNOWN_KEY);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let key_box = encode_key_box(KNOWN_KEY).unwrap();
        assert_eq!(derive_key(&key_box).unwrap(), derive_key(&key_box).unwrap());
    }

    #[test]
    fn test_missing_prefix_fails() {
        let encrypted = aes_ecb_encrypt(b"somethingelse0123", &CORE_KEY).unwrap();
        let key_box = xor_bytes(&encrypted, KEY_BOX_XOR);
        assert!(matches!(
            derive_key(&key_box),
            Err(FormatError::KeyDerivationFailed(_))
        ));
    }

    #[test]
    fn test_empty_key_fails() {
        let key_box = encode_key_box(b"").unwrap();
        assert!(matches!(
            derive_key(&key_box),
            Err(FormatError::KeyDerivationFailed(_))
        ));
    }

    #[test]
    fn test_garbage_fails() {
        assert!(derive_key(&[0x11; 7]).is_err());
        assert!(derive_key(&[]).is_err());
    }
}
