//! Lifecycle hooks: startup/shutdown callbacks for the host process and
//! connect/disconnect callbacks for bot sessions.
//!
//! Startup and shutdown hooks run sequentially in registration order; a
//! failing hook is logged and the rest still run. Connect and disconnect
//! hooks are spawned so they can never hold up a connection.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;

use bg_sessions::Session;

type LifecycleFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type SessionFn = Arc<dyn Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
pub struct LifecycleHooks {
    startup: RwLock<Vec<LifecycleFn>>,
    shutdown: RwLock<Vec<LifecycleFn>>,
    bot_connect: RwLock<Vec<SessionFn>>,
    bot_disconnect: RwLock<Vec<SessionFn>>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_startup<F>(&self, hook: F)
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.startup.write().push(Arc::new(hook));
    }

    pub fn on_shutdown<F>(&self, hook: F)
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        self.shutdown.write().push(Arc::new(hook));
    }

    pub fn on_bot_connect<F>(&self, hook: F)
    where
        F: Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.bot_connect.write().push(Arc::new(hook));
    }

    pub fn on_bot_disconnect<F>(&self, hook: F)
    where
        F: Fn(Arc<Session>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.bot_disconnect.write().push(Arc::new(hook));
    }

    /// Run startup hooks in order. Returns how many failed.
    pub async fn run_startup(&self) -> usize {
        let hooks = self.startup.read().clone();
        run_in_order("startup", hooks).await
    }

    /// Run shutdown hooks in order. Returns how many failed.
    pub async fn run_shutdown(&self) -> usize {
        let hooks = self.shutdown.read().clone();
        run_in_order("shutdown", hooks).await
    }

    pub fn fire_bot_connect(&self, session: &Arc<Session>) {
        let hooks = self.bot_connect.read().clone();
        spawn_all(hooks, session);
    }

    pub fn fire_bot_disconnect(&self, session: &Arc<Session>) {
        let hooks = self.bot_disconnect.read().clone();
        spawn_all(hooks, session);
    }
}

async fn run_in_order(stage: &'static str, hooks: Vec<LifecycleFn>) -> usize {
    let mut failed = 0;
    for (index, hook) in hooks.iter().enumerate() {
        if let Err(e) = hook().await {
            failed += 1;
            tracing::error!(stage, index, error = %e, "lifecycle hook failed");
        }
    }
    failed
}

fn spawn_all(hooks: Vec<SessionFn>, session: &Arc<Session>) {
    for hook in hooks {
        tokio::spawn(hook(session.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bg_protocol::{Payload, SelfId, TransportKind};
    use bg_sessions::BotSession;
    use futures_util::FutureExt;
    use tokio::sync::mpsc;

    struct NullBot(SelfId);

    #[async_trait]
    impl BotSession for NullBot {
        fn adapter(&self) -> &str {
            "test"
        }
        fn self_id(&self) -> &SelfId {
            &self.0
        }
        fn kind(&self) -> TransportKind {
            TransportKind::WebSocket
        }
        async fn handle_message(&self, _payload: Payload) {}
    }

    #[tokio::test]
    async fn startup_runs_in_order_and_survives_failures() {
        let hooks = LifecycleHooks::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            hooks.on_startup(move || {
                let order = order.clone();
                async move {
                    order.lock().push(n);
                    if n == 1 {
                        anyhow::bail!("hook {n} broke");
                    }
                    Ok(())
                }
                .boxed()
            });
        }

        assert_eq!(hooks.run_startup().await, 1);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(hooks.run_shutdown().await, 0);
    }

    #[tokio::test]
    async fn connect_hooks_receive_the_session() {
        let hooks = LifecycleHooks::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let calls = calls.clone();
            hooks.on_bot_connect(move |session| {
                let tx = tx.clone();
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let _ = tx.send(session.self_id.clone());
                }
                .boxed()
            });
        }

        let session = Arc::new(Session::new(
            Arc::new(NullBot(SelfId::new("B123"))),
            None,
        ));
        hooks.fire_bot_connect(&session);
        hooks.fire_bot_disconnect(&session);

        assert_eq!(rx.recv().await.unwrap().as_str(), "B123");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
