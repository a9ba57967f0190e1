use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;

use crate::backend::{MediaPlatform, MusicNotify, MusicStream};
use crate::error::MusicError;

struct RuntimeInner {
    platform: Box<dyn MediaPlatform>,
    started: bool,
}

/// 流媒体子系统的启动/关闭配对。
///
/// 无论被请求多少次，平台的 `startup` 与 `shutdown` 都只成对调用一次。
pub struct MediaRuntime {
    inner: Mutex<RuntimeInner>,
}

impl MediaRuntime {
    pub fn new(platform: Box<dyn MediaPlatform>) -> Self {
        Self {
            inner: Mutex::new(RuntimeInner {
                platform,
                started: false,
            }),
        }
    }

    pub fn startup(&self) -> Result<(), MusicError> {
        let mut inner = self.inner.lock();
        if inner.started {
            return Ok(());
        }

        inner.platform.startup()?;
        inner.started = true;
        info!("Streaming media subsystem started");
        Ok(())
    }

    /// 未启动时调用是安全的空操作
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if !inner.started {
            return;
        }

        inner.platform.shutdown();
        inner.started = false;
        debug!("Streaming media subsystem shut down");
    }

    pub fn is_started(&self) -> bool {
        self.inner.lock().started
    }

    pub fn create_stream(&self, notify: Arc<MusicNotify>) -> Result<Box<dyn MusicStream>, MusicError> {
        let mut inner = self.inner.lock();
        if !inner.started {
            return Err(MusicError::Device("streaming media subsystem is not started".into()));
        }
        inner.platform.create_stream(notify)
    }
}

impl Drop for MediaRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
