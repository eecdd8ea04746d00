//! メッシュパケット定義
//!
//! 送信先ノード番号・応答要求フラグ・ポート番号を持つ封筒と、
//! そのバイナリ形式を定義します。

pub mod dispatch;
pub mod message;
pub mod router;

pub use dispatch::{MeasurementHandler, ReceiveDispatcher, ReceiveTask};
pub use message::EnvironmentalMeasurement;
pub use router::PacketAllocator;

use log::warn;

/// メッシュ上のノード番号
pub type NodeNum = u32;

/// 全ノード宛てのノード番号
pub const NODENUM_BROADCAST: NodeNum = 0xFFFF_FFFF;

/// ESP-NOW 1フレームの最大長
pub const MAX_PACKET_SIZE: usize = 250;

/// ヘッダ長: [TO(4)] [FROM(4)] [ID(4)] [FLAGS(1)] [PORT(1)]
pub const HEADER_SIZE: usize = 14;

const FLAG_WANT_RESPONSE: u8 = 0x01;

/// パケットのエンコード/デコードエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshCodecError {
    #[error("frame too short: {actual} bytes (need at least {expected})")]
    TooShort { expected: usize, actual: usize },
    #[error("frame too long: {0} bytes (max 250)")]
    TooLong(usize),
    #[error("unknown port number: {0}")]
    UnknownPort(u8),
}

/// アプリケーションのポート番号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortNum {
    /// テキストメッセージ
    TextMessage = 1,
    /// 環境測定値
    EnvironmentalMeasurement = 67,
}

impl PortNum {
    /// u8からPortNumに変換
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(PortNum::TextMessage),
            67 => Some(PortNum::EnvironmentalMeasurement),
            _ => None,
        }
    }

    /// PortNumをu8に変換
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// メッシュへ送受信されるパケット
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPacket {
    pub from: NodeNum,
    pub to: NodeNum,
    pub id: u32,
    pub want_response: bool,
    pub port: PortNum,
    pub payload: Vec<u8>,
}

impl MeshPacket {
    /// パケットをバイナリ形式にシリアライズ
    ///
    /// フォーマット:
    /// ```text
    /// [TO(4)] [FROM(4)] [ID(4)] [FLAGS(1)] [PORT(1)] [PAYLOAD(n)]
    /// ```
    pub fn serialize(&self) -> Result<Vec<u8>, MeshCodecError> {
        let total = HEADER_SIZE + self.payload.len();
        if total > MAX_PACKET_SIZE {
            return Err(MeshCodecError::TooLong(total));
        }

        let mut data = Vec::with_capacity(total);
        data.extend_from_slice(&self.to.to_le_bytes());
        data.extend_from_slice(&self.from.to_le_bytes());
        data.extend_from_slice(&self.id.to_le_bytes());
        data.push(if self.want_response { FLAG_WANT_RESPONSE } else { 0 });
        data.push(self.port.to_u8());
        data.extend_from_slice(&self.payload);
        Ok(data)
    }

    /// バイナリデータからパケットをデシリアライズ
    pub fn deserialize(data: &[u8]) -> Result<Self, MeshCodecError> {
        if data.len() < HEADER_SIZE {
            return Err(MeshCodecError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }
        if data.len() > MAX_PACKET_SIZE {
            return Err(MeshCodecError::TooLong(data.len()));
        }

        let to = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let from = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let id = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let want_response = data[12] & FLAG_WANT_RESPONSE != 0;
        let port = PortNum::from_u8(data[13]).ok_or_else(|| {
            warn!("Dropping packet {} with unknown port {}", id, data[13]);
            MeshCodecError::UnknownPort(data[13])
        })?;

        Ok(Self {
            from,
            to,
            id,
            want_response,
            port,
            payload: data[HEADER_SIZE..].to_vec(),
        })
    }
}

/// メッシュ送信インターフェースのトレイト
///
/// 送信は投げっぱなし (fire-and-forget) で、配送結果は呼び出し側に返しません。
/// 実機用 (ESP-NOW) とテスト用 (Mock) の実装を切り替えることができます。
pub trait MeshService {
    /// パケットをメッシュへ送出する
    fn send_to_mesh(&mut self, packet: MeshPacket);
}

/// ノード番号を表示用の "!xxxxxxxx" 形式に変換
pub fn format_node_num(node: NodeNum) -> String {
    if node == NODENUM_BROADCAST {
        "broadcast".to_string()
    } else {
        format!("!{:08x}", node)
    }
}

/// 設定文字列からノード番号を解析
///
/// "broadcast"、"!28abcdef" (16進)、"0x28abcdef"、10進数を受け付けます。
pub fn parse_node_num(s: &str) -> Option<NodeNum> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("broadcast") {
        return Some(NODENUM_BROADCAST);
    }
    if let Some(hex) = s.strip_prefix('!').or_else(|| s.strip_prefix("0x")) {
        return u32::from_str_radix(hex, 16).ok();
    }
    s.parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> MeshPacket {
        MeshPacket {
            from: 0x28AB_CDEF,
            to: NODENUM_BROADCAST,
            id: 7,
            want_response: true,
            port: PortNum::EnvironmentalMeasurement,
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_packet_serialization_layout() {
        let data = sample_packet().serialize().unwrap();

        assert_eq!(data.len(), HEADER_SIZE + 3);
        assert_eq!(&data[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&data[4..8], &[0xEF, 0xCD, 0xAB, 0x28]);
        assert_eq!(data[12], FLAG_WANT_RESPONSE);
        assert_eq!(data[13], 67);

        let decoded = MeshPacket::deserialize(&data).unwrap();
        assert_eq!(decoded, sample_packet());
    }

    #[test]
    fn test_packet_too_short() {
        let result = MeshPacket::deserialize(&[0u8; 5]);
        assert_eq!(
            result,
            Err(MeshCodecError::TooShort {
                expected: HEADER_SIZE,
                actual: 5
            })
        );
    }

    #[test]
    fn test_packet_too_long() {
        let mut packet = sample_packet();
        packet.payload = vec![0u8; MAX_PACKET_SIZE];
        assert!(matches!(packet.serialize(), Err(MeshCodecError::TooLong(_))));
    }

    #[test]
    fn test_unknown_port_rejected() {
        let mut data = sample_packet().serialize().unwrap();
        data[13] = 0xEE;
        assert_eq!(
            MeshPacket::deserialize(&data),
            Err(MeshCodecError::UnknownPort(0xEE))
        );
    }

    #[test]
    fn test_parse_node_num() {
        assert_eq!(parse_node_num("broadcast"), Some(NODENUM_BROADCAST));
        assert_eq!(parse_node_num("BROADCAST"), Some(NODENUM_BROADCAST));
        assert_eq!(parse_node_num("!28abcdef"), Some(0x28AB_CDEF));
        assert_eq!(parse_node_num("0x10"), Some(16));
        assert_eq!(parse_node_num("42"), Some(42));
        assert_eq!(parse_node_num("!zz"), None);
        assert_eq!(parse_node_num(""), None);
    }

    #[test]
    fn test_format_node_num() {
        assert_eq!(format_node_num(NODENUM_BROADCAST), "broadcast");
        assert_eq!(format_node_num(0x28AB_CDEF), "!28abcdef");
    }
}
