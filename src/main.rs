use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    espnow::EspNow,
    hal::peripherals::Peripherals,
    nvs::EspDefaultNvsPartition,
    sys::{esp, esp_wifi_set_channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE},
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi, WifiDeviceId},
};
use log::{error, info};
use std::sync::{mpsc, Arc, Mutex};

use env_measurement_node::communication::esp_now::EspNowMeshService;
use env_measurement_node::communication::mesh::format_node_num;
use env_measurement_node::hardware::dht_esp::EspDhtBus;
use env_measurement_node::scheduler::FreeRtosDelay;
use env_measurement_node::{
    install_measurement_plugin, AppConfig, DhtSensor, MacAddress, PacketAllocator,
    ReceiveDispatcher, ReceiveTask, Scheduler,
};

/// アプリケーションのメインエントリーポイント
fn main() -> anyhow::Result<()> {
    // ESP-IDFの基本初期化
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Environmental measurement node v{}", env_measurement_node::VERSION);

    // 設定ファイル読み込み
    let app_config = AppConfig::load().map_err(|e| {
        error!("設定ファイルの読み込みに失敗しました: {}", e);
        anyhow::anyhow!("設定ファイルの読み込みエラー: {}", e)
    })?;

    info!("ペリフェラルを初期化しています");
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    // ESP-NOW用にWiFiをSTAモードで起動（APには接続しない）
    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?,
        sysloop,
    )?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        auth_method: AuthMethod::None,
        ..Default::default()
    }))?;
    wifi.start()?;
    let channel = app_config.esp_now_channel;
    esp!(unsafe { esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE) })?;
    info!("WiFiがESP-NOW用にSTAモードで起動しました (channel {})", channel);

    let mac = MacAddress::new(wifi.wifi().get_mac(WifiDeviceId::Sta)?);
    let allocator = PacketAllocator::new(mac.node_num());
    info!("ノード番号: {} (MAC={})", format_node_num(allocator.our_node()), mac);

    // ESP-NOW
    let esp_now = Arc::new(Mutex::new(EspNow::take()?));
    let mesh = EspNowMeshService::new(Arc::clone(&esp_now))?;
    let (tx, rx) = mpsc::channel();
    mesh.register_receiver(tx)?;

    // DHTセンサー
    let model = app_config.dht_model;
    let sensor = DhtSensor::new(EspDhtBus::new(app_config.dht_gpio_pin, model), model);

    // タスク登録
    let mut scheduler = Scheduler::new(FreeRtosDelay);
    let mut dispatcher = ReceiveDispatcher::new();
    let plugin = install_measurement_plugin(
        app_config.polling.clone(),
        sensor,
        mesh,
        allocator,
        &mut scheduler,
        &mut dispatcher,
    );
    if plugin.is_none() {
        info!("環境測定は無効です。受信処理のみ実行します");
    }
    scheduler.add_task(Box::new(ReceiveTask::new(rx, dispatcher)));

    info!("=== スケジューラを開始します ===");
    scheduler.run_forever();

    // WiFiとESP-NOWはループ終了まで保持する
    drop(esp_now);
    drop(wifi);
    Ok(())
}
