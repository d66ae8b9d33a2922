/// Port定義（Clean Architectureのインターフェース）
///
/// Domain層が外部実装に依存するための抽象trait。
/// Infrastructure層がこれらを実装し、Application層がDIで注入する。
/// 実機のドライバ・トラッカーSDKへのバインディングは本リポジトリの外にあり、
/// ここではテスト可能な境界だけを定義する。

use crate::domain::{
    ConnectionType, DebugFrame, DomainResult, ImagePosition, Quaternion, RgbColor, SensorSample,
    TrackingStatus, Vec3,
};

/// デバイスポート: モーションコントローラ1台との入出力を抽象化
pub trait DevicePort: Send {
    /// 新しいサンプルが到着しているかポーリングする
    ///
    /// falseの場合、このサイクルではデバイスをスキップする（ブロックしない）。
    fn poll(&mut self) -> bool;

    /// 最新のセンサーサンプルを読み取る
    ///
    /// `poll()`がtrueを返した後に呼び出すこと。
    fn read_sample(&mut self) -> DomainResult<SensorSample>;

    /// LEDの色を設定する
    fn set_leds(&mut self, color: RgbColor) -> DomainResult<()>;

    /// 振動レベルを設定する（0で停止）
    fn set_rumble(&mut self, level: u8) -> DomainResult<()>;

    /// 姿勢クォータニオンをリセットする
    fn reset_orientation(&mut self) -> DomainResult<()>;

    /// 接続種別を取得する
    fn connection_type(&self) -> ConnectionType;
}

/// トラッカーポート: カメラベースの位置推定を抽象化
///
/// フレーム取得→デバイスごとの更新、の順で毎サイクル呼び出される。
pub trait TrackerPort: Send {
    /// カメラフレームを更新する（ブロッキング、フレームレートに律速される）
    fn update_frame(&mut self) -> DomainResult<()>;

    /// 指定デバイスの追跡を1ステップ進める
    fn update_device(&mut self, device_id: usize) -> DomainResult<()>;

    /// 指定デバイスの追跡状態を取得する
    fn status(&self, device_id: usize) -> TrackingStatus;

    /// 画像平面上の位置を取得する（ピクセル単位）
    fn image_position(&self, device_id: usize) -> DomainResult<ImagePosition>;

    /// 3次元位置推定を取得する
    fn location(&self, device_id: usize) -> DomainResult<Vec3>;

    /// トラッカーが自動割り当てした追跡色を取得する
    fn color(&self, device_id: usize) -> DomainResult<RgbColor>;

    /// 注釈付きデバッグフレームを描画して返す
    fn annotate(&mut self) -> DomainResult<DebugFrame>;

    /// カメラフレームのサイズを取得する（u/v正規化の分母）
    fn frame_size(&self) -> (u32, u32);
}

/// ポーズレポータポート: セカンダリプロトコルへの再配信を抽象化
///
/// ブリッジワーカーが固定周期で呼び出す。量子化・ビットレイアウトは
/// プロトコル実装側の責務で、ここには現れない。
pub trait PoseReporterPort: Send {
    /// デバイスのボタン状態を報告する（マスクごとに1ビット展開済み）
    fn report_buttons(&mut self, device_id: usize, pressed: &[bool]) -> DomainResult<()>;

    /// アナログチャンネル（トリガー）を報告する
    fn report_analog(&mut self, device_id: usize, value: f64) -> DomainResult<()>;

    /// 位置・姿勢を報告する
    ///
    /// positionはメートル単位、quatは `x, y, z, w` の順。
    fn report_pose(&mut self, device_id: usize, position: [f64; 3], quat: [f64; 4])
        -> DomainResult<()>;

    /// プロトコル自身のサイクル処理を実行する
    fn dispatch(&mut self) -> DomainResult<()>;
}
