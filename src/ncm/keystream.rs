//! 音频负载使用的密钥流密码。
//!
//! 这是一个 RC4 的变体：密钥调度（KSA）与标准 RC4 相同，
//! 但输出阶段不再更新 S 盒，第 `i` 个字节的密钥流只取决于 `i mod 256`。
//! 因此整个密钥流以 256 字节为周期，可以预先算好，并支持从任意偏移开始解密。

use crate::error::FormatError;

/// 密钥流的周期长度
pub const KEYSTREAM_PERIOD: usize = 256;

/// 预先计算好的 256 字节密钥流。
#[derive(Clone)]
pub struct KeyStream {
    stream: [u8; KEYSTREAM_PERIOD],
}

impl std::fmt::Debug for KeyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStream").finish_non_exhaustive()
    }
}

impl KeyStream {
    /// 使用派生出的密钥初始化密钥流。
    ///
    /// 密钥为空时无法进行调度，返回 `FormatError::KeyDerivationFailed`。
    pub fn new(key: &[u8]) -> Result<Self, FormatError> {
        if key.is_empty() {
            return Err(FormatError::KeyDerivationFailed("密钥长度为 0".into()));
        }

        let sbox = schedule(key);
        let mut stream = [0u8; KEYSTREAM_PERIOD];
        for (i, out) in stream.iter_mut().enumerate() {
            let j = (i + 1) & 0xff;
            let a = sbox[j] as usize;
            let b = sbox[(a + j) & 0xff] as usize;
            *out = sbox[(a + b) & 0xff];
        }

        Ok(Self { stream })
    }

    /// 绝对位置 `position` 处的密钥流字节。
    #[inline]
    pub fn byte_at(&self, position: u64) -> u8 {
        self.stream[(position % KEYSTREAM_PERIOD as u64) as usize]
    }

    /// 将以绝对偏移 `offset` 开始的数据与密钥流异或。
    ///
    /// 异或是对称的，所以同一个函数既用于解密也用于加密。
    pub fn apply_at(&self, offset: u64, data: &mut [u8]) {
        let start = (offset % KEYSTREAM_PERIOD as u64) as usize;
        for (byte, key) in data
            .iter_mut()
            .zip(self.stream.iter().cycle().skip(start))
        {
            *byte ^= key;
        }
    }
}

/// 标准 RC4 密钥调度：以密钥字节驱动对恒等置换的逐位交换。
fn schedule(key: &[u8]) -> [u8; KEYSTREAM_PERIOD] {
    let mut sbox = [0u8; KEYSTREAM_PERIOD];
    for (i, slot) in sbox.iter_mut().enumerate() {
        *slot = i as u8;
    }

    let mut j: u8 = 0;
    for i in 0..KEYSTREAM_PERIOD {
        j = j.wrapping_add(sbox[i]).wrapping_add(key[i % key.len()]);
        sbox.swap(i, j as usize);
    }
    sbox
}
