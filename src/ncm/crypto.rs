//! NCM 容器使用的固定常量与 AES-128-ECB 辅助函数。
//!
//! 这些密钥是格式常量，写死在网易云音乐客户端中，不是需要保护的秘密。

use aes::{
    Aes128,
    cipher::{BlockSizeUser, generic_array::GenericArray},
};
use block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit};
use ecb::{Decryptor as EcbModeDecryptor, Encryptor as EcbModeEncryptor};

/// 解密密钥区块所用的 AES 密钥 (`hzHRAmso5kInbaxW`)
pub const CORE_KEY: [u8; 16] = [
    0x68, 0x7A, 0x48, 0x52, 0x41, 0x6D, 0x73, 0x6F, 0x35, 0x6B, 0x49, 0x6E, 0x62, 0x61, 0x78, 0x57,
];

/// 解密元数据区块所用的 AES 密钥 (`#14ljk_!\]&0U<'(`)
pub const META_KEY: [u8; 16] = [
    0x23, 0x31, 0x34, 0x6C, 0x6A, 0x6B, 0x5F, 0x21, 0x5C, 0x5D, 0x26, 0x30, 0x55, 0x3C, 0x27, 0x28,
];

/// 密钥区块的逐字节异或值
pub const KEY_BOX_XOR: u8 = 0x64;
/// 元数据区块的逐字节异或值
pub const META_BOX_XOR: u8 = 0x63;

/// 密钥区块解密后的固定头部
pub const KEY_PREFIX: &[u8] = b"neteasecloudmusic";
/// 元数据区块异或后的 ASCII 标记
pub const META_PREFIX: &[u8] = b"163 key(Don't modify):";

/// AES-128-ECB 解密并去除 PKCS#7 填充。
///
/// # 返回
/// - `Ok(Vec<u8>)`: 去除填充后的明文。
/// - `Err(String)`: 长度不是块大小的整数倍，或填充无效。
pub fn aes_ecb_decrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>, String> {
    let block_size = Aes128::block_size();
    if data.is_empty() || !data.len().is_multiple_of(block_size) {
        return Err(format!(
            "密文长度必须为 {block_size} 的正整数倍，实际为 {}",
            data.len()
        ));
    }

    let cipher = EcbModeDecryptor::<Aes128>::new(GenericArray::from_slice(key));
    let mut buffer = data.to_vec();
    let plaintext = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| format!("AES ECB 解密失败: {e:?}"))?;

    Ok(plaintext.to_vec())
}

/// AES-128-ECB 加密并添加 PKCS#7 填充，是 [`aes_ecb_decrypt`] 的逆操作。
///
/// 用于重新封装容器（例如构造测试数据）。
pub fn aes_ecb_encrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>, String> {
    let cipher = EcbModeEncryptor::<Aes128>::new(GenericArray::from_slice(key));

    let mut buffer = data.to_vec();
    let msg_len = buffer.len();

    let block_size = Aes128::block_size();
    let padded_len = (msg_len / block_size + 1) * block_size;
    buffer.resize(padded_len, 0);

    let ciphertext = cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, msg_len)
        .map_err(|e| format!("AES ECB 加密失败: {e:?}"))?;

    Ok(ciphertext.to_vec())
}

/// 对字节切片逐字节异或一个常量。
pub(crate) fn xor_bytes(data: &[u8], value: u8) -> Vec<u8> {
    data.iter().map(|b| b ^ value).collect()
}
