//! 環境測定値メッセージ

use super::MeshCodecError;

/// エンコード後のバイト長 (f32 x 3)
pub const ENCODED_SIZE: usize = 12;

/// 湿度・温度・気圧の測定値
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvironmentalMeasurement {
    /// 相対湿度（%）
    pub relative_humidity: f32,
    /// 温度（℃）
    pub temperature: f32,
    /// 気圧（hPa）。気圧センサー未接続のため常に0
    pub barometric_pressure: f32,
}

impl EnvironmentalMeasurement {
    /// 測定値をバイナリ形式にエンコード
    ///
    /// フォーマット:
    /// ```text
    /// [HUMIDITY(4)] [TEMPERATURE(4)] [PRESSURE(4)]
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(ENCODED_SIZE);
        data.extend_from_slice(&self.relative_humidity.to_le_bytes());
        data.extend_from_slice(&self.temperature.to_le_bytes());
        data.extend_from_slice(&self.barometric_pressure.to_le_bytes());
        data
    }

    /// バイナリデータから測定値をデコード
    pub fn decode(data: &[u8]) -> Result<Self, MeshCodecError> {
        if data.len() < ENCODED_SIZE {
            return Err(MeshCodecError::TooShort {
                expected: ENCODED_SIZE,
                actual: data.len(),
            });
        }

        let field = |i: usize| f32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        Ok(Self {
            relative_humidity: field(0),
            temperature: field(4),
            barometric_pressure: field(8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_encoding() {
        let m = EnvironmentalMeasurement {
            relative_humidity: 50.0,
            temperature: -3.5,
            barometric_pressure: 0.0,
        };
        let data = m.encode();

        assert_eq!(data.len(), ENCODED_SIZE);
        assert_eq!(&data[0..4], &50.0f32.to_le_bytes());
        assert_eq!(EnvironmentalMeasurement::decode(&data).unwrap(), m);
    }

    #[test]
    fn test_measurement_decode_too_short() {
        let result = EnvironmentalMeasurement::decode(&[0u8; 8]);
        assert_eq!(
            result,
            Err(MeshCodecError::TooShort {
                expected: ENCODED_SIZE,
                actual: 8
            })
        );
    }
}
