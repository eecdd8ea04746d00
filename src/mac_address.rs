use std::fmt;

/// MACアドレスを表す構造体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub(crate) [u8; 6]);

impl MacAddress {
    /// ESP-NOWのブロードキャストアドレス
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    /// バイト配列からMACアドレスを作成
    pub fn new(addr: [u8; 6]) -> Self {
        MacAddress(addr)
    }

    /// バイト配列を取得
    pub fn into_bytes(self) -> [u8; 6] {
        self.0
    }

    /// メッシュ上のノード番号を導出します
    ///
    /// 下位4バイトをビッグエンディアンで解釈した値を使用します。
    pub fn node_num(&self) -> u32 {
        u32::from_be_bytes([self.0[2], self.0[3], self.0[4], self.0[5]])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_address_display() {
        let mac = MacAddress::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", mac), "aa:bb:cc:dd:ee:ff");
        assert_eq!(MacAddress::BROADCAST.to_string(), "ff:ff:ff:ff:ff:ff");
    }

    #[test]
    fn test_node_num_uses_low_four_bytes() {
        let mac = MacAddress::new([0x24, 0x6F, 0x28, 0xAB, 0xCD, 0xEF]);
        assert_eq!(mac.node_num(), 0x28AB_CDEF);
        assert_eq!(mac.into_bytes(), [0x24, 0x6F, 0x28, 0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn test_broadcast_node_num() {
        assert_eq!(MacAddress::BROADCAST.node_num(), u32::MAX);
    }
}
