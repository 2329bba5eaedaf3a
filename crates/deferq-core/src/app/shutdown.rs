//! Shutdown - producer と ClaimLoop が共有する協調的な停止シグナル
//!
//! ループはイテレーション先頭でのみフラグを見る。実行中のストア呼び出しや
//! タスク処理は必ず最後まで走る。

use tokio::sync::watch;

/// 停止を要求する側。clone は同じフラグを共有する。
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request a stop. Safe to call any number of times, including after
    /// every listener is gone.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// ループ側。
#[derive(Debug, Clone)]
pub struct StopListener {
    rx: watch::Receiver<bool>,
}

impl StopListener {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// A listener that is never stopped. Handy for loops that end on their
    /// own (drain mode, bounded producer).
    pub fn never() -> Self {
        ShutdownSignal::new().listener()
    }

    /// Resolves once a stop is requested. Pends forever when the owning
    /// signal is gone without having stopped.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
