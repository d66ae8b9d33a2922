//! サーバーランナー: 共有テーブルの構築、ワーカーの起動と停止
//!
//! 注入されたポート実装からワーカー一式を組み立て、コンソールコマンドの
//! 制御ループを回す。終了時は全ワーカーのキャンセルフラグを立ててjoinする。

use crate::application::bridge::BridgeWorker;
use crate::application::capture::CaptureWorker;
use crate::application::command::{bind_recv_socket, CommandWorker};
use crate::application::rate::WorkerStats;
use crate::application::session::{SessionContext, ShutdownFlag};
use crate::application::state::{CommandTable, DeviceStateTable};
use crate::application::tracker::TrackerWorker;
use crate::domain::{
    AppConfig, ConnectionType, DevicePort, DomainError, DomainResult, PoseReporterPort,
    TrackerPort,
};
use crossbeam_channel::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{error, info, warn};

/// コンソールから受け付ける制御コマンド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// デバッグフレームの表示を開始
    ShowDebug,
    /// デバッグフレームの表示を停止
    HideDebug,
    /// 指定デバイスの姿勢リセットを要求
    Calibrate(usize),
    /// サーバーを終了
    Exit,
}

/// 起動済みワーカーのハンドル
struct WorkerHandle {
    name: &'static str,
    flag: ShutdownFlag,
    handle: JoinHandle<()>,
}

/// サーバーランナー
///
/// トラッカーが`None`の場合は縮退モードで起動し、位置テレメトリと
/// 追跡色の管理は行われない（物理テレメトリとコマンド処理は動く）。
pub struct ServerRunner<D, T, R>
where
    D: DevicePort + 'static,
    T: TrackerPort + 'static,
    R: PoseReporterPort + 'static,
{
    config: AppConfig,
    devices: Vec<D>,
    tracker: Option<T>,
    reporter: Option<R>,
}

impl<D, T, R> ServerRunner<D, T, R>
where
    D: DevicePort + 'static,
    T: TrackerPort + 'static,
    R: PoseReporterPort + 'static,
{
    pub fn new(config: AppConfig, devices: Vec<D>, tracker: Option<T>, reporter: Option<R>) -> Self {
        Self {
            config,
            devices,
            tracker,
            reporter,
        }
    }

    /// サーバーを起動し、コンソールコマンドで終了するまでブロックする
    pub fn run(self, console: Receiver<ConsoleCommand>) -> DomainResult<()> {
        let device_count = self.devices.len();
        info!("Starting server: devices={}", device_count);

        for (device_id, device) in self.devices.iter().enumerate() {
            if device.connection_type() == ConnectionType::Usb {
                warn!(
                    "Device {} is connected via USB and will not report sensor data",
                    device_id
                );
            }
        }

        let states = Arc::new(DeviceStateTable::new(device_count));
        let commands = Arc::new(CommandTable::new(
            device_count,
            self.config.capture.rumble_ticks,
        ));
        let session = Arc::new(SessionContext::new());

        let tracker_enabled = self.tracker.is_some();
        if let Some(tracker) = &self.tracker {
            for device_id in 0..device_count {
                match tracker.color(device_id) {
                    Ok(color) => commands.seed_tracker_color(device_id, color),
                    Err(e) => warn!("No tracker color for device {}: {}", device_id, e),
                }
            }
        } else {
            warn!("Tracker unavailable, running in degraded mode (no position telemetry)");
        }

        // 受信ソケットのバインド失敗は致命的（起動中断）
        let recv_socket = bind_recv_socket(&self.config.network)?;

        let shared_devices: Vec<Arc<Mutex<D>>> = self
            .devices
            .into_iter()
            .map(|d| Arc::new(Mutex::new(d)))
            .collect();

        let mut workers: Vec<WorkerHandle> = Vec::new();
        let stats_interval = self.config.pipeline.stats_interval();

        {
            let flag = ShutdownFlag::new();
            let worker = CaptureWorker::new(
                shared_devices.clone(),
                Arc::clone(&states),
                Arc::clone(&commands),
                Arc::clone(&session),
                flag.clone(),
                self.config.capture.clone(),
                tracker_enabled,
                WorkerStats::new(stats_interval),
            );
            workers.push(spawn_worker("capture-worker", flag, move || worker.run())?);
        }

        if let Some(tracker) = self.tracker {
            let flag = ShutdownFlag::new();
            let worker = TrackerWorker::new(
                tracker,
                shared_devices.clone(),
                Arc::clone(&states),
                Arc::clone(&session),
                flag.clone(),
                WorkerStats::new(stats_interval),
            );
            workers.push(spawn_worker("tracker-worker", flag, move || worker.run())?);
        }

        {
            let flag = ShutdownFlag::new();
            let worker = CommandWorker::new(
                recv_socket,
                Arc::clone(&commands),
                Arc::clone(&session),
                flag.clone(),
                self.config.network.send_port,
            );
            workers.push(spawn_worker("command-worker", flag, move || worker.run())?);
        }

        if self.config.bridge.enabled {
            if let Some(reporter) = self.reporter {
                let flag = ShutdownFlag::new();
                let worker = BridgeWorker::new(
                    reporter,
                    Arc::clone(&states),
                    flag.clone(),
                    self.config.bridge.clone(),
                );
                workers.push(spawn_worker("bridge-worker", flag, move || worker.run())?);
            } else {
                warn!("Bridge enabled in config but no reporter available");
            }
        }

        info!("Server running: {} workers", workers.len());

        // 制御ループ（コンソールの切断も終了扱い）
        loop {
            match console.recv() {
                Ok(ConsoleCommand::ShowDebug) => session.set_show_debug(true),
                Ok(ConsoleCommand::HideDebug) => session.set_show_debug(false),
                Ok(ConsoleCommand::Calibrate(device_id)) => {
                    if commands.request_reset(device_id) {
                        info!("Calibration requested: device={}", device_id);
                    } else {
                        warn!("Calibration requested for unknown device: {}", device_id);
                    }
                }
                Ok(ConsoleCommand::Exit) | Err(_) => break,
            }
        }

        info!("Shutting down workers");
        for worker in &workers {
            worker.flag.trigger();
        }
        for worker in workers {
            if worker.handle.join().is_err() {
                error!("Worker panicked: {}", worker.name);
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

fn spawn_worker<F>(name: &'static str, flag: ShutdownFlag, body: F) -> DomainResult<WorkerHandle>
where
    F: FnOnce() + Send + 'static,
{
    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| DomainError::Other(format!("failed to spawn {}: {}", name, e)))?;
    Ok(WorkerHandle { name, flag, handle })
}
