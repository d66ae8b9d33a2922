//! 共有テーブル（デバイス状態・コマンド）
//!
//! DeviceStateTableはエントリごとに1ロック（細粒度、デバイス間の更新が
//! 互いをブロックしない）。CommandTableはテーブル全体で1ロック（粗粒度、
//! コマンド更新はセンサー更新に比べて稀なので十分）。
//! トランザクションが複数テーブルにまたがることはなく、テーブル間の
//! 厳密な一貫性は要求しない。

use crate::domain::wire::CommandUpdate;
use crate::domain::{DeviceState, Quaternion, RgbColor, Vec3};
use std::sync::{Mutex, MutexGuard};

/// 振動ティックカウンタのアイドル番兵値
///
/// 0に到達して「振動停止」コマンドを一度発行した後はこの値になり、
/// 停止コマンドの再送を防ぐ。
pub const RUMBLE_IDLE: i32 = -1;

/// デバイスごとの保留コマンド（1エントリ）
///
/// booleanの「要求」フラグはマージ専用: Command Workerはfalse→trueの
/// 遷移のみ行い、true→falseへ戻せるのは消費側のCapture Workerだけ。
/// 無関係なコマンドデータグラムの連打で保留中の要求が失われることを防ぐ。
#[derive(Debug, Clone, Copy)]
pub struct CommandEntry {
    /// 振動レベル（0-255）
    pub rumble_level: u8,
    /// 残り振動ティック数（RUMBLE_IDLEでアイドル）
    pub rumble_ticks_remaining: i32,
    /// 姿勢リセット要求
    pub reset_orientation_requested: bool,
    /// LED色変更要求（colorへ変更）
    pub light_change_requested: bool,
    /// トラッカー割り当て色への復帰要求（tracked_colorへ変更）
    pub tracker_light_requested: bool,
    /// クライアント指定の現在色
    pub color: RgbColor,
    /// トラッカーが自動割り当てした追跡色（復帰用キャッシュ）
    pub tracked_color: RgbColor,
}

impl Default for CommandEntry {
    fn default() -> Self {
        Self {
            rumble_level: 0,
            rumble_ticks_remaining: RUMBLE_IDLE,
            reset_orientation_requested: false,
            // 起動直後の最初のサイクルで初期色をデバイスへ反映させる
            light_change_requested: true,
            tracker_light_requested: false,
            color: RgbColor::default(),
            tracked_color: RgbColor::default(),
        }
    }
}

/// 共有コマンドテーブル
///
/// Command Workerが要求を書き込み、Capture Workerが消費する。
pub struct CommandTable {
    entries: Mutex<Vec<CommandEntry>>,
    /// 振動コマンドの有効サイクル数（設定値）
    rumble_ticks: u32,
}

impl CommandTable {
    pub fn new(device_count: usize, rumble_ticks: u32) -> Self {
        Self {
            entries: Mutex::new(vec![CommandEntry::default(); device_count]),
            rumble_ticks,
        }
    }

    pub fn device_count(&self) -> usize {
        self.entries.lock().expect("command table lock poisoned").len()
    }

    /// テーブル全体のロックを取得する（Capture Workerの消費ステップ用）
    ///
    /// デバイスへのコマンド発行はこのガードを保持したまま行う。
    pub fn lock(&self) -> MutexGuard<'_, Vec<CommandEntry>> {
        self.entries.lock().expect("command table lock poisoned")
    }

    /// クライアントのコマンド更新をマージ適用する
    ///
    /// デバイスIDが範囲外の場合は何も変更せずfalseを返す
    /// （呼び出し側は黙って破棄する）。
    pub fn apply(&self, update: &CommandUpdate) -> bool {
        let mut entries = self.entries.lock().expect("command table lock poisoned");
        let Some(entry) = entries.get_mut(update.device_id) else {
            return false;
        };

        if update.change_rumble {
            entry.rumble_level = update.rumble_level;
            entry.rumble_ticks_remaining = self.rumble_ticks as i32;
        }

        // マージ専用: false→trueのみ。true→falseへ戻すのは消費側の責務。
        // （姿勢リセットの保留中に振動パケットが連打されても要求が消えない）
        entry.tracker_light_requested |= update.tracker_light;
        entry.reset_orientation_requested |= update.reset_orientation;

        if update.change_light && !update.tracker_light {
            entry.light_change_requested = true;
            entry.color = update.color;
        }

        true
    }

    /// トラッカーの自動割り当て色を初期値として登録する（起動時）
    pub fn seed_tracker_color(&self, device_id: usize, color: RgbColor) {
        let mut entries = self.entries.lock().expect("command table lock poisoned");
        if let Some(entry) = entries.get_mut(device_id) {
            entry.tracked_color = color;
            entry.color = color;
        }
    }

    /// 姿勢リセットを要求する（コンソールの`calibrate`コマンドから）
    pub fn request_reset(&self, device_id: usize) -> bool {
        let mut entries = self.entries.lock().expect("command table lock poisoned");
        match entries.get_mut(device_id) {
            Some(entry) => {
                entry.reset_orientation_requested = true;
                true
            }
            None => false,
        }
    }

    /// 指定デバイスのエントリのスナップショットを返す（テスト・ログ用）
    pub fn snapshot(&self, device_id: usize) -> Option<CommandEntry> {
        self.entries
            .lock()
            .expect("command table lock poisoned")
            .get(device_id)
            .copied()
    }
}

/// 共有デバイス状態テーブル
///
/// エントリごとに独立したロックを持ち、あるデバイスの更新が
/// 別のデバイスの更新・読み出しをブロックしない。
pub struct DeviceStateTable {
    entries: Vec<Mutex<DeviceState>>,
}

impl DeviceStateTable {
    pub fn new(device_count: usize) -> Self {
        Self {
            entries: (0..device_count)
                .map(|_| Mutex::new(DeviceState::default()))
                .collect(),
        }
    }

    pub fn device_count(&self) -> usize {
        self.entries.len()
    }

    /// モーション系フィールドを更新する（Capture Worker専用）
    pub fn update_motion(
        &self,
        device_id: usize,
        buttons: u32,
        trigger: f32,
        orientation: Quaternion,
    ) {
        let mut state = self.entries[device_id]
            .lock()
            .expect("device state lock poisoned");
        state.buttons = buttons;
        state.trigger = trigger;
        state.orientation = orientation;
    }

    /// 位置フィールドを更新する（Tracker Worker専用）
    pub fn update_position(&self, device_id: usize, position: Vec3) {
        let mut state = self.entries[device_id]
            .lock()
            .expect("device state lock poisoned");
        state.position = position;
    }

    /// エントリ全体のスナップショットを取得する
    ///
    /// エントリロック下でコピーするため、部分更新が見えることはない。
    pub fn snapshot(&self, device_id: usize) -> DeviceState {
        *self.entries[device_id]
            .lock()
            .expect("device state lock poisoned")
    }
}
