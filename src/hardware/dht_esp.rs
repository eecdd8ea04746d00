use super::dht::{pulses_to_frame, BitPulse, DhtBus, DhtError, DhtModel};
use esp_idf_svc::hal::interrupt;
use esp_idf_svc::sys::{
    esp, ets_delay_us, gpio_get_level, gpio_mode_t, gpio_mode_t_GPIO_MODE_INPUT,
    gpio_mode_t_GPIO_MODE_OUTPUT, gpio_pull_mode_t_GPIO_PULLUP_ONLY, gpio_set_direction,
    gpio_set_level, gpio_set_pull_mode,
};
use log::{error, info};

/// GPIOのビットバンギングでDHTと通信するバス
///
/// # 配線例
/// ```text
/// DHT11/DHT22:
/// - VCC  -> 3.3V
/// - GND  -> GND
/// - Data -> GPIO13 (4.7kΩ プルアップ)
/// ```
pub struct EspDhtBus {
    pin: i32,
    model: DhtModel,
}

impl EspDhtBus {
    pub fn new(pin: i32, model: DhtModel) -> Self {
        Self { pin, model }
    }

    fn set_direction(&self, mode: gpio_mode_t) -> Result<(), DhtError> {
        esp!(unsafe { gpio_set_direction(self.pin, mode) })
            .map_err(|e| DhtError::Gpio(e.code()))
    }

    /// データ線が `state` の間待ち、経過マイクロ秒を返す
    fn wait_while(
        &self,
        state: i32,
        max_wait_us: u32,
        phase: &'static str,
    ) -> Result<u32, DhtError> {
        let mut u_sec = 0;
        unsafe {
            while gpio_get_level(self.pin) == state {
                u_sec += 1;
                if u_sec > max_wait_us {
                    return Err(DhtError::Timeout(phase));
                }
                ets_delay_us(1);
            }
        }
        Ok(u_sec)
    }

    /// 応答と40ビットのパルス幅を計測する
    ///
    /// 割り込み禁止区間内で呼ぶこと。
    fn measure_pulses(&self) -> Result<[BitPulse; 40], DhtError> {
        unsafe {
            gpio_set_level(self.pin, 1);
            ets_delay_us(30);
        }
        self.set_direction(gpio_mode_t_GPIO_MODE_INPUT)?;

        // 応答: Low 80us -> High 80us
        self.wait_while(1, 60, "response start")?;
        self.wait_while(0, 85, "response low")?;
        self.wait_while(1, 85, "response high")?;

        let mut pulses = [BitPulse::default(); 40];
        for pulse in pulses.iter_mut() {
            pulse.low_us = self.wait_while(0, 75, "bit start")?;
            pulse.high_us = self.wait_while(1, 100, "bit value")?;
        }
        Ok(pulses)
    }
}

impl DhtBus for EspDhtBus {
    type Error = DhtError;

    fn begin(&mut self) {
        info!("DHTセンサーを初期化中... (Data: GPIO{}, Model: {:?})", self.pin, self.model);
        let pull = esp!(unsafe { gpio_set_pull_mode(self.pin, gpio_pull_mode_t_GPIO_PULLUP_ONLY) });
        if let Err(e) = pull {
            error!("GPIO{} のプルアップ設定に失敗しました: {}", self.pin, e);
        }
        if let Err(e) = self.set_direction(gpio_mode_t_GPIO_MODE_INPUT) {
            error!("GPIO{} の入力設定に失敗しました: {}", self.pin, e);
        }
    }

    fn read_frame(&mut self) -> Result<[u8; 5], DhtError> {
        // スタート信号のLow保持（DHT11では20ms）は割り込み禁止区間の外で行う
        self.set_direction(gpio_mode_t_GPIO_MODE_OUTPUT)?;
        unsafe {
            gpio_set_level(self.pin, 0);
            ets_delay_us(self.model.start_signal_us());
        }

        // 応答とビット列の計測は割り込み禁止区間で行う
        let pulses = interrupt::free(|| self.measure_pulses())?;

        Ok(pulses_to_frame(&pulses))
    }
}
