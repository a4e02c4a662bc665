use tokio_util::sync::CancellationToken;

/// Cooperative cancellation shared between the caller and a reconciliation run.
///
/// Once signalled it stays signalled, so every later gateway call and backoff
/// sleep observes it as well.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(CancellationToken);

impl Shutdown {
    pub fn new() -> Self {
        Shutdown(CancellationToken::new())
    }

    pub fn shutdown(&self) {
        self.0.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn wait(&self) {
        self.0.cancelled().await
    }
}
