//! 后台任务句柄
//!
//! 每个注册（续期）和每个解析器（监听）都对应一个独立的后台任务，
//! 任务通过 oneshot 关闭信号停止，并且可以被等待结束。

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;

/// 等待任务自行退出的最长时间，超时后强制中止
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 任务侧的关闭信号
///
/// 信号触发（或句柄被丢弃）后 `recv` 总是立即返回，可以在循环中反复等待。
pub struct ShutdownSignal {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl ShutdownSignal {
    /// 等待关闭信号
    pub async fn recv(&mut self) {
        if self.fired {
            return;
        }
        let _ = (&mut self.rx).await;
        self.fired = true;
    }

    /// 执行 `fut`，关闭信号先到达时放弃执行并返回 `None`
    pub async fn guard<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.recv() => None,
            output = fut => Some(output),
        }
    }

    /// 反复执行 `attempt` 直到成功，两次尝试之间等待 `delay`
    ///
    /// 收到关闭信号时返回 `None`
    pub async fn retry<T, F, Fut>(&mut self, delay: Duration, mut attempt: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        loop {
            if let Ok(value) = self.guard(attempt()).await? {
                return Some(value);
            }
            self.guard(tokio::time::sleep(delay)).await?;
        }
    }
}

impl From<oneshot::Receiver<()>> for ShutdownSignal {
    fn from(rx: oneshot::Receiver<()>) -> Self {
        Self { rx, fired: false }
    }
}

/// 后台任务句柄
///
/// 持有任务的关闭信号发送端和 `JoinHandle`。
/// 句柄被丢弃时会发送关闭信号，任务在下一个挂起点退出。
pub struct TaskHandle {
    name: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// 启动后台任务
    ///
    /// `task_fn` 接收关闭信号，返回任务 Future
    pub fn spawn<F, Fut>(name: impl Into<String>, task_fn: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(task_fn(ShutdownSignal::from(shutdown_rx)));
        debug!(task = %name, "background task started");

        Self {
            name,
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 任务是否已经结束
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|join| join.is_finished())
    }

    /// 发送关闭信号，不等待任务退出
    pub fn cancel(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            // 任务已经退出时接收端已关闭，忽略发送失败
            let _ = tx.send(());
        }
    }

    /// 发送关闭信号并等待任务退出，最多等待 `SHUTDOWN_TIMEOUT`
    pub async fn shutdown(self) {
        self.shutdown_within(SHUTDOWN_TIMEOUT).await;
    }

    /// 发送关闭信号并最多等待 `grace`，超时后中止任务
    ///
    /// 任务在期限内自行退出时返回 `true`
    pub async fn shutdown_within(mut self, grace: Duration) -> bool {
        self.cancel();
        let Some(mut join) = self.join.take() else {
            return true;
        };
        match tokio::time::timeout(grace, &mut join).await {
            Ok(Ok(())) => {
                debug!(task = %self.name, "background task stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(task = %self.name, error = %e, "background task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    task = %self.name,
                    grace = ?grace,
                    "background task did not stop in time, aborting"
                );
                join.abort();
                false
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// 按服务地址索引的续期任务集合
#[derive(Default)]
pub struct TaskSet {
    tasks: tokio::sync::Mutex<std::collections::HashMap<String, TaskHandle>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记任务，同一地址已有任务时发送关闭信号并替换
    pub async fn insert(&self, addr: impl Into<String>, handle: TaskHandle) {
        let addr = addr.into();
        let previous = self.tasks.lock().await.insert(addr.clone(), handle);
        if let Some(previous) = previous {
            debug!(address = %addr, task = %previous.name(), "replacing renewal task");
            previous.shutdown().await;
        }
    }

    /// 取出地址对应的任务
    pub async fn take(&self, addr: &str) -> Option<TaskHandle> {
        self.tasks.lock().await.remove(addr)
    }

    pub async fn contains(&self, addr: &str) -> bool {
        self.tasks.lock().await.contains_key(addr)
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// 停止所有任务并等待退出
    pub async fn shutdown_all(&self) {
        let tasks: Vec<TaskHandle> = self.tasks.lock().await.drain().map(|(_, t)| t).collect();
        for task in tasks {
            task.shutdown().await;
        }
    }
}
