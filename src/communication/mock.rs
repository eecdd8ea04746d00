use super::mesh::{MeshPacket, MeshService};
use std::sync::{Arc, Mutex};

/// テスト用のメッシュ送信モック実装
///
/// 実際の無線を使わずに送信されたパケットを記録し、テストで検証できます。
/// クローンは記録を共有するため、タスクに渡した後も送信内容を確認できます。
#[derive(Debug, Clone, Default)]
pub struct MockMeshService {
    /// 送信されたパケットの記録
    pub sent_packets: Arc<Mutex<Vec<MeshPacket>>>,
}

impl MockMeshService {
    /// 新しいMockMeshServiceインスタンスを作成します
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用: 送信されたパケットを取得
    pub fn get_sent_packets(&self) -> Vec<MeshPacket> {
        self.sent_packets.lock().unwrap().clone()
    }

    /// テスト用: 送信されたパケット数を取得
    pub fn sent_count(&self) -> usize {
        self.sent_packets.lock().unwrap().len()
    }

    /// テスト用: 送信記録をクリア
    pub fn clear_sent_packets(&self) {
        self.sent_packets.lock().unwrap().clear();
    }
}

impl MeshService for MockMeshService {
    fn send_to_mesh(&mut self, packet: MeshPacket) {
        self.sent_packets.lock().unwrap().push(packet);
    }
}
