//! Command Worker: クライアントからのデータグラム受信
//!
//! 受信ソケットを専有し、接続ハンドシェイク（`c`）とコマンド更新（`d`）を
//! 処理する。クライアント確立前は接続マーカー以外のデータグラムをすべて
//! 無視する。受信はタイムアウト付きで、サイクルごとにキャンセルフラグを
//! 確認できる。不正なデータグラムは黙って破棄する（ACKチャンネルがない）。

use crate::application::session::{SessionContext, ShutdownFlag};
use crate::application::state::CommandTable;
use crate::domain::wire::{parse_datagram, ClientDatagram};
use crate::domain::{DomainError, DomainResult, NetworkConfig};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tracing::{error, info, trace, warn};

/// 受信ソケットをバインドする（起動時、失敗は致命的）
pub fn bind_recv_socket(config: &NetworkConfig) -> DomainResult<UdpSocket> {
    let addr = format!("{}:{}", config.bind_address, config.recv_port);
    let socket = UdpSocket::bind(&addr)
        .map_err(|e| DomainError::SocketSetup(format!("failed to bind {}: {}", addr, e)))?;
    socket
        .set_read_timeout(Some(config.recv_timeout()))
        .map_err(|e| DomainError::SocketSetup(format!("failed to set read timeout: {}", e)))?;
    Ok(socket)
}

/// Command Worker本体
pub struct CommandWorker {
    socket: UdpSocket,
    commands: Arc<CommandTable>,
    session: Arc<SessionContext>,
    shutdown: ShutdownFlag,
    send_port: u16,
}

impl CommandWorker {
    pub fn new(
        socket: UdpSocket,
        commands: Arc<CommandTable>,
        session: Arc<SessionContext>,
        shutdown: ShutdownFlag,
        send_port: u16,
    ) -> Self {
        Self {
            socket,
            commands,
            session,
            shutdown,
            send_port,
        }
    }

    /// ワーカーループ（専用スレッドで実行）
    ///
    /// 受信タイムアウトごとにキャンセルフラグを確認する。回復不能な
    /// ソケットエラーではこのワーカーだけが終了し、テレメトリ送信側は
    /// 既存のクライアントに対して動き続ける。
    pub fn run(self) {
        info!("Command worker started: recv={:?}", self.socket.local_addr());

        let mut buf = [0u8; 1024];
        while !self.shutdown.is_set() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, addr)) => self.handle_datagram(&buf[..len], addr),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    error!("Receive failed, command worker exiting: {}", e);
                    break;
                }
            }
        }

        info!("Command worker stopped");
    }

    /// 1データグラム分の処理
    fn handle_datagram(&self, payload: &[u8], sender: SocketAddr) {
        let datagram = match parse_datagram(payload) {
            Ok(datagram) => datagram,
            Err(e) => {
                trace!("Discarding malformed datagram from {}: {}", sender, e);
                return;
            }
        };

        match datagram {
            ClientDatagram::Connect => self.handle_connect(sender),
            ClientDatagram::Command(update) => {
                // ハンドシェイク前はコマンドを受け付けない（接続マーカー以外は
                // すべて無視する）。未認証のピアがデバイスを操作できてしまう。
                if !self.session.okay_to_send() {
                    trace!("Discarding command before handshake from {}", sender);
                    return;
                }
                if self.commands.apply(&update) {
                    trace!("Command applied: device={}", update.device_id);
                } else {
                    trace!(
                        "Discarding command for unknown device: id={}, from={}",
                        update.device_id,
                        sender
                    );
                }
            }
        }
    }

    /// 接続マーカーの処理
    ///
    /// 最初の`c`だけがクライアントを確立する。送信先アドレスは
    /// 送信元IPと設定の送信ポートから構成する（送信元ポートではない）。
    fn handle_connect(&self, sender: SocketAddr) {
        if self.session.okay_to_send() {
            trace!("Ignoring connect marker, client already attached: {}", sender);
            return;
        }

        let client_addr = SocketAddr::new(sender.ip(), self.send_port);
        let socket = match UdpSocket::bind("0.0.0.0:0").and_then(|s| {
            s.connect(client_addr)?;
            Ok(s)
        }) {
            Ok(socket) => socket,
            Err(e) => {
                warn!("Failed to open send socket for {}: {}", client_addr, e);
                return;
            }
        };

        if self.session.try_attach_client(socket, client_addr) {
            info!("Client connected: {}", client_addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::state::RUMBLE_IDLE;
    use std::time::Duration;

    fn make_worker(send_port: u16) -> (CommandWorker, Arc<CommandTable>, Arc<SessionContext>) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let commands = Arc::new(CommandTable::new(2, 150));
        let session = Arc::new(SessionContext::new());
        let worker = CommandWorker::new(
            socket,
            Arc::clone(&commands),
            Arc::clone(&session),
            ShutdownFlag::new(),
            send_port,
        );
        (worker, commands, session)
    }

    #[test]
    fn test_connect_attaches_client() {
        // クライアント側の受信ソケット
        let client_recv = UdpSocket::bind("127.0.0.1:0").unwrap();
        let send_port = client_recv.local_addr().unwrap().port();
        let (worker, _, session) = make_worker(send_port);

        let sender: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        worker.handle_datagram(b"c", sender);

        assert!(session.okay_to_send());
        assert_eq!(
            session.client_addr().unwrap().port(),
            send_port,
            "send port must come from config, not the sender's source port"
        );

        // 確立済みソケット経由でクライアントへ届く
        session.send_to_client("a 0 0 0 0").unwrap();
        client_recv
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let mut buf = [0u8; 64];
        let (len, _) = client_recv.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"a 0 0 0 0");
    }

    #[test]
    fn test_second_connect_ignored() {
        let client_recv = UdpSocket::bind("127.0.0.1:0").unwrap();
        let send_port = client_recv.local_addr().unwrap().port();
        let (worker, _, session) = make_worker(send_port);

        worker.handle_datagram(b"c", "127.0.0.1:50000".parse().unwrap());
        let first = session.client_addr();

        worker.handle_datagram(b"c", "127.0.0.2:50001".parse().unwrap());
        assert_eq!(session.client_addr(), first);
    }

    #[test]
    fn test_command_routed_to_table() {
        let client_recv = UdpSocket::bind("127.0.0.1:0").unwrap();
        let send_port = client_recv.local_addr().unwrap().port();
        let (worker, commands, _) = make_worker(send_port);
        let sender: SocketAddr = "127.0.0.1:50000".parse().unwrap();

        worker.handle_datagram(b"c", sender);
        worker.handle_datagram(b"d 1 1 200 0 0 0 0 0 0", sender);

        let entry = commands.snapshot(1).unwrap();
        assert_eq!(entry.rumble_level, 200);
        assert_eq!(entry.rumble_ticks_remaining, 150);
    }

    #[test]
    fn test_command_before_handshake_discarded() {
        let (worker, commands, session) = make_worker(23459);
        let sender: SocketAddr = "127.0.0.1:50000".parse().unwrap();

        // クライアント確立前の`d`はテーブルに触れない
        worker.handle_datagram(b"d 0 1 200 0 0 0 0 0 0", sender);

        assert!(!session.okay_to_send());
        let entry = commands.snapshot(0).unwrap();
        assert_eq!(entry.rumble_level, 0);
        assert_eq!(entry.rumble_ticks_remaining, RUMBLE_IDLE);
        assert!(!entry.reset_orientation_requested);
    }

    #[test]
    fn test_malformed_and_out_of_range_discarded() {
        let (worker, commands, session) = make_worker(23459);
        let sender: SocketAddr = "127.0.0.1:50000".parse().unwrap();

        worker.handle_datagram(b"garbage", sender);
        worker.handle_datagram(b"d 9 1 200 0 0 0 0 0 0", sender);
        worker.handle_datagram(b"", sender);

        // どのテーブルにも変化がない
        assert!(!session.okay_to_send());
        for id in 0..2 {
            assert_eq!(commands.snapshot(id).unwrap().rumble_level, 0);
        }
    }

    #[test]
    fn test_bind_recv_socket_rejects_port_in_use() {
        let holder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let config = NetworkConfig {
            bind_address: "127.0.0.1".to_string(),
            recv_port: port,
            ..NetworkConfig::default()
        };
        let result = bind_recv_socket(&config);
        assert!(matches!(result, Err(DomainError::SocketSetup(_))));
    }
}
