//! ワーカー統計
//!
//! サイクルレートの計測と定期的なログ出力。
//! 各ワーカーが自分のインスタンスを所有し、ロックは不要。

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// レート計測ウィンドウ（直近1秒間のサイクル数でレートを出す）
const RATE_WINDOW: Duration = Duration::from_secs(1);

/// ワーカーごとの統計カウンタ
pub struct WorkerStats {
    cycle_times: VecDeque<Instant>,
    emitted: u64,
    skipped: u64,
    report_interval: Duration,
    last_report: Instant,
}

impl WorkerStats {
    pub fn new(report_interval: Duration) -> Self {
        Self {
            cycle_times: VecDeque::new(),
            emitted: 0,
            skipped: 0,
            report_interval,
            last_report: Instant::now(),
        }
    }

    /// サイクル完了を記録
    pub fn record_cycle(&mut self) {
        let now = Instant::now();
        self.cycle_times.push_back(now);

        // ウィンドウ外の記録を破棄
        while let Some(&front) = self.cycle_times.front() {
            if now.duration_since(front) > RATE_WINDOW {
                self.cycle_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// テレメトリメッセージの送信を記録
    pub fn record_emitted(&mut self) {
        self.emitted += 1;
    }

    /// 送信スキップ（クライアント未接続等）を記録
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// 直近1秒間のサイクルレート（cycles/sec）
    pub fn current_rate(&self) -> f64 {
        self.cycle_times.len() as f64 / RATE_WINDOW.as_secs_f64()
    }

    /// 報告間隔が経過したか
    pub fn should_report(&self) -> bool {
        self.last_report.elapsed() >= self.report_interval
    }

    /// 統計をログへ出力し、報告タイマーをリセット
    pub fn report(&mut self, worker_name: &str) {
        info!(
            "Stats [{}]: rate={:.1} cycles/sec, emitted={}, skipped={}",
            worker_name,
            self.current_rate(),
            self.emitted,
            self.skipped
        );
        self.last_report = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_calculation() {
        let mut stats = WorkerStats::new(Duration::from_secs(10));
        for _ in 0..30 {
            stats.record_cycle();
        }
        // 30サイクルすべてがウィンドウ内
        assert_eq!(stats.current_rate(), 30.0);
    }

    #[test]
    fn test_counters() {
        let mut stats = WorkerStats::new(Duration::from_secs(10));
        stats.record_emitted();
        stats.record_emitted();
        stats.record_skipped();
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_should_report_after_interval() {
        let mut stats = WorkerStats::new(Duration::from_millis(0));
        assert!(stats.should_report());

        stats.report_interval = Duration::from_secs(3600);
        stats.report("test");
        assert!(!stats.should_report());
    }
}
