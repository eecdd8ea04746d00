use super::mesh::{format_node_num, MeshCodecError, MeshPacket, MeshService};
use crate::mac_address::MacAddress;
use esp_idf_svc::espnow::{EspNow, PeerInfo, ReceiveInfo};
use esp_idf_svc::sys::EspError;
use log::{debug, error, info, warn};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// ESP-NOWメッシュ送受信エラー
#[derive(Debug, thiserror::Error)]
pub enum EspNowMeshError {
    #[error("ESP-NOWピア追加エラー: {0}")]
    AddPeerFailed(EspError),

    #[error("ESP-NOW送信エラー: {0}")]
    SendFailed(EspError),

    #[error("ESP-NOW受信コールバック登録エラー: {0}")]
    RegisterCallbackFailed(EspError),

    #[error("パケット形式エラー: {0}")]
    Codec(#[from] MeshCodecError),
}

/// ESP-NOWのブロードキャストでメッシュパケットを送受信する
#[derive(Clone)]
pub struct EspNowMeshService {
    esp_now: Arc<Mutex<EspNow<'static>>>,
}

impl std::fmt::Debug for EspNowMeshService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EspNowMeshService")
            .field("peer_mac", &MacAddress::BROADCAST)
            .finish()
    }
}

impl EspNowMeshService {
    /// ブロードキャストピアを登録して送受信機を初期化します
    pub fn new(esp_now: Arc<Mutex<EspNow<'static>>>) -> Result<Self, EspNowMeshError> {
        let service = Self { esp_now };
        service.add_broadcast_peer()?;
        Ok(service)
    }

    fn add_broadcast_peer(&self) -> Result<(), EspNowMeshError> {
        info!("ESP-NOWピア追加: MAC={}", MacAddress::BROADCAST);

        let peer_info = PeerInfo {
            peer_addr: MacAddress::BROADCAST.into_bytes(),
            channel: 0,
            ifidx: esp_idf_svc::wifi::WifiDeviceId::Sta.into(),
            encrypt: false,
            lmk: [0u8; 16],
            priv_: std::ptr::null_mut(),
        };

        let esp_now_guard = self.esp_now.lock().unwrap();
        esp_now_guard.add_peer(peer_info).map_err(|e| {
            error!("ESP-NOWピア追加失敗: {:?}", e);
            EspNowMeshError::AddPeerFailed(e)
        })?;

        info!("ESP-NOWピア追加成功");
        Ok(())
    }

    /// 受信したフレームをパケットに変換してチャネルへ送る
    ///
    /// コールバックはWi-Fiタスク上で実行されるため、処理はスケジューラ側で行います。
    pub fn register_receiver(&self, tx: Sender<MeshPacket>) -> Result<(), EspNowMeshError> {
        let esp_now_guard = self.esp_now.lock().unwrap();
        esp_now_guard
            .register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
                match MeshPacket::deserialize(data) {
                    Ok(packet) => {
                        debug!(
                            "Received packet {} from {} via {:02X?}",
                            packet.id,
                            format_node_num(packet.from),
                            info.src_addr
                        );
                        if tx.send(packet).is_err() {
                            warn!("Mesh receive queue is closed, dropping packet");
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring malformed ESP-NOW frame ({} bytes): {}", data.len(), e)
                    }
                }
            })
            .map_err(EspNowMeshError::RegisterCallbackFailed)
    }

    fn transmit(&self, packet: &MeshPacket) -> Result<(), EspNowMeshError> {
        let data = packet.serialize()?;
        let esp_now_guard = self.esp_now.lock().unwrap();
        esp_now_guard
            .send(MacAddress::BROADCAST.into_bytes(), &data)
            .map_err(EspNowMeshError::SendFailed)
    }
}

impl MeshService for EspNowMeshService {
    fn send_to_mesh(&mut self, packet: MeshPacket) {
        match self.transmit(&packet) {
            Ok(()) => debug!(
                "Sent packet {} to {} ({} bytes payload)",
                packet.id,
                format_node_num(packet.to),
                packet.payload.len()
            ),
            Err(e) => error!("Failed to send packet {}: {}", packet.id, e),
        }
    }
}
