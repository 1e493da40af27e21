//! 事件流来源：Hyprland 的 .socket2.sock
//!
//! 以 trait 抽象连接，测试中可以用内存管道替代 Unix 套接字。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::net::UnixStream;

use crate::core::TransportError;

pub type EventStream = Box<dyn AsyncBufRead + Send + Unpin>;

#[async_trait]
pub trait EventSource: Send + Sync {
    /// 建立一次连接，返回按行读取的事件流
    async fn connect(&self) -> Result<EventStream, TransportError>;

    /// 日志中显示的来源描述
    fn describe(&self) -> String;
}

/// Hyprland 事件套接字
#[derive(Debug, Clone)]
pub struct HyprlandSocket {
    path: PathBuf,
}

impl HyprlandSocket {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 由配置覆盖路径或环境变量推导套接字路径；不在 Hyprland 会话中时返回 NoInstance
    pub fn locate(override_path: Option<&Path>) -> Result<Self, TransportError> {
        if let Some(path) = override_path {
            return Ok(Self::new(path));
        }
        let signature = std::env::var("HYPRLAND_INSTANCE_SIGNATURE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(TransportError::NoInstance)?;
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from);
        Ok(Self::new(socket_path(runtime_dir.as_deref(), &signature)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `$XDG_RUNTIME_DIR/hypr/<sig>/.socket2.sock`；旧版本 Hyprland 使用 /tmp/hypr
pub fn socket_path(runtime_dir: Option<&Path>, signature: &str) -> PathBuf {
    if let Some(dir) = runtime_dir {
        let candidate = dir.join("hypr").join(signature).join(".socket2.sock");
        if candidate.exists() {
            return candidate;
        }
        let legacy = legacy_path(signature);
        if legacy.exists() {
            return legacy;
        }
        return candidate;
    }
    legacy_path(signature)
}

fn legacy_path(signature: &str) -> PathBuf {
    Path::new("/tmp/hypr").join(signature).join(".socket2.sock")
}

#[async_trait]
impl EventSource for HyprlandSocket {
    async fn connect(&self) -> Result<EventStream, TransportError> {
        let stream = UnixStream::connect(&self.path).await?;
        Ok(Box::new(BufReader::new(stream)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_path_prefers_runtime_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sock_dir = dir.path().join("hypr").join("abc123");
        std::fs::create_dir_all(&sock_dir).unwrap();
        std::fs::write(sock_dir.join(".socket2.sock"), b"").unwrap();
        assert_eq!(
            socket_path(Some(dir.path()), "abc123"),
            sock_dir.join(".socket2.sock")
        );
    }

    #[test]
    fn test_socket_path_without_runtime_dir() {
        assert_eq!(
            socket_path(None, "sig"),
            PathBuf::from("/tmp/hypr/sig/.socket2.sock")
        );
    }

    #[test]
    fn test_override_wins() {
        let s = HyprlandSocket::locate(Some(Path::new("/run/custom.sock"))).unwrap();
        assert_eq!(s.path(), Path::new("/run/custom.sock"));
    }

    #[tokio::test]
    async fn test_connect_missing_socket_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let s = HyprlandSocket::new(dir.path().join("missing.sock"));
        assert!(matches!(s.connect().await, Err(TransportError::Io(_))));
    }
}
