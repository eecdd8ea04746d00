/// メッシュパケットと送受信の抽象化
pub mod mesh;

#[cfg(feature = "esp")]
pub mod esp_now;

// Mock実装（テストとnon-espビルドで使用可能）
#[cfg(not(feature = "esp"))]
pub mod mock;

pub use mesh::{MeshPacket, MeshService, NodeNum, NODENUM_BROADCAST};
