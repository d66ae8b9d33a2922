//! コンソールコマンドリーダー
//!
//! 標準入力を専用スレッドで読み、制御コマンドへ変換してチャンネルで
//! ランナーへ渡す。標準入力のEOFは終了コマンド扱い。

use crate::application::ConsoleCommand;
use crossbeam_channel::{bounded, Receiver};
use std::io::BufRead;
use tracing::{info, warn};

/// 1行をコマンドへ変換する
///
/// 空行・未知のコマンドは`None`（呼び出し側が使い方を表示する）。
pub fn parse_console_line(line: &str) -> Option<ConsoleCommand> {
    let mut fields = line.split_ascii_whitespace();
    match fields.next()? {
        "show-debug" => Some(ConsoleCommand::ShowDebug),
        "hide-debug" => Some(ConsoleCommand::HideDebug),
        "calibrate" => fields
            .next()
            .and_then(|id| id.parse::<usize>().ok())
            .map(ConsoleCommand::Calibrate),
        "exit" | "quit" => Some(ConsoleCommand::Exit),
        _ => None,
    }
}

/// 標準入力リーダースレッドを起動する
///
/// 戻り値のReceiverをランナーの制御ループへ渡す。リーダースレッドは
/// 標準入力で半永久にブロックするためjoinせず、プロセス終了で回収する。
pub fn spawn_console_reader() -> Receiver<ConsoleCommand> {
    let (tx, rx) = bounded(8);

    std::thread::Builder::new()
        .name("console-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Console read failed: {}", e);
                        break;
                    }
                };

                match parse_console_line(&line) {
                    Some(command) => {
                        let is_exit = command == ConsoleCommand::Exit;
                        if tx.send(command).is_err() {
                            break;
                        }
                        if is_exit {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => {
                        info!("Unknown command: {:?}", line.trim());
                        info!("Commands: show-debug, hide-debug, calibrate <id>, exit");
                    }
                }
            }
            // EOF到達時もランナーを止める（recvのErrが終了扱いになる）
            drop(tx);
        })
        .map(|_| ())
        .unwrap_or_else(|e| warn!("Failed to spawn console reader: {}", e));

    rx
}
