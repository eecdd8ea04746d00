use super::{EnvironmentalMeasurement, MeshPacket, NodeNum, PortNum, NODENUM_BROADCAST};

/// 送信パケットの割り当て
///
/// 型付きペイロードから送信元とパケットIDを埋めた封筒を作ります。
/// 宛先は既定でブロードキャスト、応答要求はなしです。
#[derive(Debug, Clone)]
pub struct PacketAllocator {
    our_node: NodeNum,
    next_id: u32,
}

impl PacketAllocator {
    pub fn new(our_node: NodeNum) -> Self {
        Self {
            our_node,
            next_id: 1,
        }
    }

    pub fn our_node(&self) -> NodeNum {
        self.our_node
    }

    /// 次のパケットIDを払い出す（0は使用しない）
    fn generate_packet_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// 環境測定値のデータパケットを作成
    pub fn alloc_data_packet(&mut self, measurement: &EnvironmentalMeasurement) -> MeshPacket {
        MeshPacket {
            from: self.our_node,
            to: NODENUM_BROADCAST,
            id: self.generate_packet_id(),
            want_response: false,
            port: PortNum::EnvironmentalMeasurement,
            payload: measurement.encode(),
        }
    }
}
