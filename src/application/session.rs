//! セッションコンテキスト（ワーカー間で共有されるプロセス全体の状態）
//!
//! 歴史的にはフリースタンディングなグローバル変数だったものを、
//! 明示的に所有されるオブジェクトとして各ワーカーへ参照渡しする。
//! `Arc<AtomicBool>`によるロックフリーのフラグ共有と、クライアント
//! ソケットスロット・デバッグビューそれぞれの独立したロックを持つ。

use crate::domain::{DebugFrame, DomainError, DomainResult};
use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// ワーカーループの協調キャンセルフラグ
///
/// 各ワーカーはイテレーションごとに`is_set()`を確認して終了する。
/// プリエンプティブな割り込みはなく、コラボレータ呼び出しの内部で
/// ブロックしたワーカーはキャンセルできない（設計上の制限）。
#[derive(Clone, Default)]
pub struct ShutdownFlag {
    flag: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// キャンセルを要求する（ワーカー所有側から呼ぶ）
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// キャンセルが要求されているか（ワーカーループ内から毎サイクル確認）
    #[inline]
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// ハンドシェイク済みクライアントへの送信口
///
/// Command Workerが最初の接続マーカー受信時に一度だけ構築する。
struct ClientLink {
    socket: UdpSocket,
    addr: SocketAddr,
}

/// デバッグビュー（表示フラグと注釈フレームバッファを1つのロックに集約）
#[derive(Default)]
struct DebugView {
    show: bool,
    frame: Option<DebugFrame>,
}

/// セッション状態（プロセス全体で1インスタンス）
///
/// `okay_to_send`はハンドシェイク成功時にCommand Workerだけが
/// false→trueへ一度だけ遷移させる。切断検出はなく、falseへ戻す
/// 機構は存在しない（ドキュメント化された制限）。
pub struct SessionContext {
    okay_to_send: AtomicBool,
    client: Mutex<Option<ClientLink>>,
    debug_view: Mutex<DebugView>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            okay_to_send: AtomicBool::new(false),
            client: Mutex::new(None),
            debug_view: Mutex::new(DebugView::default()),
        }
    }

    /// クライアントへの送信が許可されているか（ロックフリー、毎サイクル確認）
    #[inline]
    pub fn okay_to_send(&self) -> bool {
        self.okay_to_send.load(Ordering::Acquire)
    }

    /// ハンドシェイクで観測したクライアントを登録する
    ///
    /// 最初の登録者が勝つ。既にクライアントが確立している場合は
    /// falseを返し、ソケットは破棄される（2通目以降の`c`は無視）。
    pub fn try_attach_client(&self, socket: UdpSocket, addr: SocketAddr) -> bool {
        let mut slot = self.client.lock().expect("client slot lock poisoned");
        if slot.is_some() {
            return false;
        }
        *slot = Some(ClientLink { socket, addr });
        self.okay_to_send.store(true, Ordering::Release);
        true
    }

    /// 確立済みクライアントのアドレスを返す
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client
            .lock()
            .expect("client slot lock poisoned")
            .as_ref()
            .map(|link| link.addr)
    }

    /// テレメトリメッセージをクライアントへ送信する
    ///
    /// 呼び出し側は`okay_to_send()`を確認してから呼ぶこと。
    /// クライアント未確立の場合は黙って捨てる（ワーカーを止めない）。
    pub fn send_to_client(&self, message: &str) -> DomainResult<()> {
        let slot = self.client.lock().expect("client slot lock poisoned");
        if let Some(link) = slot.as_ref() {
            link.socket
                .send(message.as_bytes())
                .map_err(|e| DomainError::Send(format!("{}", e)))?;
        }
        Ok(())
    }

    /// デバッグフレームの表示フラグを切り替える（コンソールコマンドから）
    pub fn set_show_debug(&self, show: bool) {
        let mut view = self.debug_view.lock().expect("debug view lock poisoned");
        view.show = show;
        if !show {
            // 非表示に切り替えたら滞留フレームも捨てる
            view.frame = None;
        }
    }

    /// 表示フラグが立っていてバッファが空の場合のみ描画して格納する
    ///
    /// フレームが既に滞留している場合は描画せずスキップする
    /// （キューイングせず破棄し、表示経路のメモリ増加を防ぐ）。
    pub fn offer_debug_frame<F>(&self, render: F) -> DomainResult<()>
    where
        F: FnOnce() -> DomainResult<DebugFrame>,
    {
        let mut view = self.debug_view.lock().expect("debug view lock poisoned");
        if view.show && view.frame.is_none() {
            view.frame = Some(render()?);
        }
        Ok(())
    }

    /// 滞留中のデバッグフレームを取り出す（表示コラボレータ用）
    pub fn take_debug_frame(&self) -> Option<DebugFrame> {
        self.debug_view
            .lock()
            .expect("debug view lock poisoned")
            .frame
            .take()
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_socket() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    #[test]
    fn test_shutdown_flag() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_set());

        flag.trigger();
        assert!(clone.is_set());
    }

    #[test]
    fn test_attach_client_first_writer_wins() {
        let session = SessionContext::new();
        assert!(!session.okay_to_send());

        let (sock1, addr1) = loopback_socket();
        let (sock2, addr2) = loopback_socket();

        assert!(session.try_attach_client(sock1, addr1));
        assert!(session.okay_to_send());
        assert_eq!(session.client_addr(), Some(addr1));

        // 2番目の登録は拒否され、アドレスは変わらない
        assert!(!session.try_attach_client(sock2, addr2));
        assert_eq!(session.client_addr(), Some(addr1));
    }

    #[test]
    fn test_debug_frame_drop_not_queue() {
        let session = SessionContext::new();
        let frame = || {
            Ok(DebugFrame {
                width: 4,
                height: 4,
                data: vec![0; 48],
            })
        };

        // 表示フラグが立っていなければ描画されない
        session.offer_debug_frame(frame).unwrap();
        assert!(session.take_debug_frame().is_none());

        session.set_show_debug(true);
        session.offer_debug_frame(frame).unwrap();

        // 滞留中は2枚目を描画しない（呼ばれたらpanicするクロージャ）
        session
            .offer_debug_frame(|| panic!("must not render while a frame is pending"))
            .unwrap();

        assert!(session.take_debug_frame().is_some());
        assert!(session.take_debug_frame().is_none());
    }

    #[test]
    fn test_hide_debug_discards_pending_frame() {
        let session = SessionContext::new();
        session.set_show_debug(true);
        session
            .offer_debug_frame(|| {
                Ok(DebugFrame {
                    width: 1,
                    height: 1,
                    data: vec![0; 3],
                })
            })
            .unwrap();

        session.set_show_debug(false);
        assert!(session.take_debug_frame().is_none());
    }
}
