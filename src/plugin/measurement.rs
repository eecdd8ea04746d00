use crate::communication::mesh::EnvironmentalMeasurement;

/// センサー読み取り結果（ハードウェア非依存）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub humidity: f32,
    pub temperature: f32,
    /// 気圧センサー未接続のため常に0
    pub pressure: f32,
}

impl SensorReading {
    pub fn new(humidity: f32, temperature: f32) -> Self {
        Self {
            humidity,
            temperature,
            pressure: 0.0,
        }
    }

    /// 湿度・温度がともに有限値なら有効
    ///
    /// NaN はドライバが通信失敗を表す値です。
    pub fn is_valid(&self) -> bool {
        self.humidity.is_finite() && self.temperature.is_finite()
    }

    pub fn to_measurement(&self) -> EnvironmentalMeasurement {
        EnvironmentalMeasurement {
            relative_humidity: self.humidity,
            temperature: self.temperature,
            barometric_pressure: self.pressure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_is_zero() {
        let reading = SensorReading::new(50.0, 22.0);
        assert_eq!(reading.pressure, 0.0);
        assert_eq!(reading.to_measurement().barometric_pressure, 0.0);
    }

    #[test]
    fn test_validity() {
        assert!(SensorReading::new(50.0, -5.0).is_valid());
        assert!(!SensorReading::new(f32::NAN, 22.0).is_valid());
        assert!(!SensorReading::new(50.0, f32::NAN).is_valid());
        assert!(!SensorReading::new(f32::INFINITY, 22.0).is_valid());
    }
}
