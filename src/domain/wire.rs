//! UDPワイヤプロトコルのコーデック
//!
//! スペース区切りのASCIIテキストを1データグラム1メッセージで送受信する。
//! 長さプレフィックスなし、ACKなし、再送なし。
//!
//! - `c` : 接続ハンドシェイク（クライアント→サーバ）
//! - `d <id> <changeRumble> <rumbleLevel> <resetOrientation> <trackerLight> <changeLight> <r> <g> <b>`
//! - `a <msgNo> <id> <buttons> <trigger> <ax> <ay> <az> <gx> <gy> <gz> <mx> <my> <mz> <orientationEnabled> <qw> <qx> <qy> <qz> <r> <g> <b>`
//! - `b <seqNo> <id> <x> <y> <z> <u> <v> <tracking>`

use crate::domain::{buttons, DomainError, DomainResult, RgbColor, SensorSample, Vec3};

/// 生ボタンマスクをワイヤ上の8bit表現に詰め替える
///
/// クライアント側でのビット演算を単純にするための歴史的なレイアウト:
/// X=128, Sq=64, Tri=32, O=16, Move=8, St=4, Se=2, PS=1
pub fn pack_buttons(raw: u32) -> u8 {
    let mut packed = 0u8;
    if raw & buttons::CROSS != 0 {
        packed |= 1 << 7;
    }
    if raw & buttons::SQUARE != 0 {
        packed |= 1 << 6;
    }
    if raw & buttons::TRIANGLE != 0 {
        packed |= 1 << 5;
    }
    if raw & buttons::CIRCLE != 0 {
        packed |= 1 << 4;
    }
    if raw & buttons::MOVE != 0 {
        packed |= 1 << 3;
    }
    if raw & buttons::START != 0 {
        packed |= 1 << 2;
    }
    if raw & buttons::SELECT != 0 {
        packed |= 1 << 1;
    }
    if raw & buttons::PS != 0 {
        packed |= 1;
    }
    packed
}

/// 物理テレメトリ（メッセージA）を整形する
///
/// Capture Workerがサイクルごと・デバイスごとに送信する。
/// 色フィールドはコマンドテーブルの現在色（クライアントが最後に指示した色）。
pub fn format_physical(
    msg_no: u32,
    device_id: usize,
    sample: &SensorSample,
    color: RgbColor,
) -> String {
    let q = sample.orientation.unwrap_or_default();
    let orientation_enabled = i32::from(sample.orientation.is_some());
    format!(
        "a {} {} {} {} {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} {:.3} {} {:.3} {:.3} {:.3} {:.3} {} {} {}",
        msg_no,
        device_id,
        pack_buttons(sample.buttons),
        sample.trigger,
        sample.accel.x,
        sample.accel.y,
        sample.accel.z,
        sample.gyro.x,
        sample.gyro.y,
        sample.gyro.z,
        sample.mag.x,
        sample.mag.y,
        sample.mag.z,
        orientation_enabled,
        q.w,
        q.x,
        q.y,
        q.z,
        color.r,
        color.g,
        color.b,
    )
}

/// 位置テレメトリ（メッセージB）を整形する
///
/// u/vはカメラフレームサイズで正規化済みの画像平面座標。
pub fn format_position(
    seq_no: u32,
    device_id: usize,
    location: Vec3,
    u: f32,
    v: f32,
    tracking: bool,
) -> String {
    format!(
        "b {} {} {:.6} {:.6} {:.6} {:.6} {:.6} {}",
        seq_no,
        device_id,
        location.x,
        location.y,
        location.z,
        u,
        v,
        i32::from(tracking),
    )
}

/// クライアントからのコマンド更新（`d`データグラムのデコード結果）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandUpdate {
    pub device_id: usize,
    pub change_rumble: bool,
    pub rumble_level: u8,
    pub reset_orientation: bool,
    pub tracker_light: bool,
    pub change_light: bool,
    pub color: RgbColor,
}

/// クライアントから受信したデータグラムの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientDatagram {
    /// 接続マーカー `c`
    Connect,
    /// コマンド更新 `d ...`
    Command(CommandUpdate),
}

/// 受信データグラムを解析する
///
/// フィールド数の不足・数値の範囲外はすべて`MalformedDatagram`。
/// このプロトコルにはACKチャンネルがないため、呼び出し側は黙って破棄する。
pub fn parse_datagram(payload: &[u8]) -> DomainResult<ClientDatagram> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| DomainError::MalformedDatagram("not valid UTF-8".to_string()))?;
    let mut fields = text.split_ascii_whitespace();

    match fields.next() {
        Some("c") => Ok(ClientDatagram::Connect),
        Some("d") => {
            let mut next_int = |name: &str| -> DomainResult<i64> {
                fields
                    .next()
                    .ok_or_else(|| DomainError::MalformedDatagram(format!("missing field: {name}")))?
                    .parse::<i64>()
                    .map_err(|_| DomainError::MalformedDatagram(format!("bad field: {name}")))
            };

            let device_id = next_int("deviceId")?;
            let change_rumble = next_int("changeRumble")?;
            let rumble_level = next_int("rumbleLevel")?;
            let reset_orientation = next_int("resetOrientation")?;
            let tracker_light = next_int("trackerLight")?;
            let change_light = next_int("changeLight")?;
            let r = next_int("r")?;
            let g = next_int("g")?;
            let b = next_int("b")?;

            if device_id < 0 {
                return Err(DomainError::MalformedDatagram(
                    "negative device id".to_string(),
                ));
            }
            let byte = |name: &str, v: i64| -> DomainResult<u8> {
                u8::try_from(v)
                    .map_err(|_| DomainError::MalformedDatagram(format!("{name} out of range")))
            };

            Ok(ClientDatagram::Command(CommandUpdate {
                device_id: device_id as usize,
                change_rumble: change_rumble != 0,
                rumble_level: byte("rumbleLevel", rumble_level)?,
                reset_orientation: reset_orientation != 0,
                tracker_light: tracker_light != 0,
                change_light: change_light != 0,
                color: RgbColor::new(byte("r", r)?, byte("g", g)?, byte("b", b)?),
            }))
        }
        Some(other) => Err(DomainError::MalformedDatagram(format!(
            "unknown marker: {other}"
        ))),
        None => Err(DomainError::MalformedDatagram("empty datagram".to_string())),
    }
}
