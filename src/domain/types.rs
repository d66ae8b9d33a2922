/// コア型定義
///
/// Domain層の中心となるデータ構造。
/// デバイスドライバ・トラッカーから読み取ったサンプルと、
/// ワーカー間で共有される状態レコードを表現する。

/// RGBカラー（LED制御・トラッカー割り当て色）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// 姿勢クォータニオン
///
/// ドライバのセンサーフュージョンが出力する向き。`w, x, y, z`の順で保持する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// 単位クォータニオン（姿勢情報なしの既定値）
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// 3次元ベクトル（加速度・角速度・磁気・位置）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// デバイスドライバの生ボタンマスク値
///
/// ドライバが報告するビット位置。ワイヤ上の8bitパック表現とは別物で、
/// 変換は`wire::pack_buttons`が行う。
pub mod buttons {
    pub const TRIANGLE: u32 = 1 << 4;
    pub const CIRCLE: u32 = 1 << 5;
    pub const CROSS: u32 = 1 << 6;
    pub const SQUARE: u32 = 1 << 7;
    pub const SELECT: u32 = 1 << 8;
    pub const START: u32 = 1 << 11;
    pub const PS: u32 = 1 << 16;
    pub const MOVE: u32 = 1 << 19;
    pub const TRIGGER: u32 = 1 << 20;
}

/// デバイスドライバから読み取った1サンプル
///
/// `DevicePort::read_sample()`の戻り値。poll成功後にのみ有効。
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSample {
    /// 生ボタンマスク（`buttons`モジュールのビット位置）
    pub buttons: u32,
    /// アナログトリガーの生値（0-255）
    pub trigger: u8,
    /// 加速度
    pub accel: Vec3,
    /// 角速度
    pub gyro: Vec3,
    /// 磁気
    pub mag: Vec3,
    /// 姿勢（フュージョン無効時はNone）
    pub orientation: Option<Quaternion>,
}

/// デバイスの接続種別
///
/// USB接続のデバイスはセンサーデータを返さないため、起動時に警告する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Bluetooth,
    Usb,
    Unknown,
}

/// トラッカーによるデバイスの追跡状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    /// 現フレームで追跡に成功
    Tracking,
    /// 追跡できていない（キャリブレーション未完了・視野外等）
    NotTracking,
}

/// 画像平面上の追跡位置（ピクセル単位、正規化前）
#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePosition {
    pub u: f32,
    pub v: f32,
    pub radius: f32,
}

/// トラッカーが描画した注釈付きデバッグフレーム
///
/// Tracker Workerが生成し、外部の表示コラボレータが取り出す。
#[derive(Debug, Clone)]
pub struct DebugFrame {
    pub width: u32,
    pub height: u32,
    /// BGR形式、連続メモリ
    pub data: Vec<u8>,
}

/// 共有デバイス状態（デバイスごとに1エントリ）
///
/// Capture Workerがbuttons/trigger/orientationを、
/// Tracker Workerがpositionを更新する。読み手はブリッジワーカーと
/// 各ワーカーのメッセージ送信ステップ。
#[derive(Debug, Clone, Copy)]
pub struct DeviceState {
    /// 生ボタンマスク
    pub buttons: u32,
    /// 正規化済みトリガー値 [0,1]
    pub trigger: f32,
    /// 最新の姿勢（未取得時は単位クォータニオン）
    pub orientation: Quaternion,
    /// トラッカー推定位置
    pub position: Vec3,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            buttons: 0,
            trigger: 0.0,
            orientation: Quaternion::identity(),
            position: Vec3::default(),
        }
    }
}
