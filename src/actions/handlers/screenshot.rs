//! screenshot：grim 截屏
//!
//! ScreenCapture 也被请求处理层复用，为 `screenshot=true` 的查询附图；
//! 截屏动作本身把图片写到输出目录并返回路径。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::actions::handlers::run_program;
use crate::actions::{Action, ActionHandler, ActionKind};
use crate::config::ScreenshotSection;
use crate::llm::ImageAttachment;

/// grim 封装：缩放、编码格式与大小上限来自 [screenshot] 配置
#[derive(Debug, Clone)]
pub struct ScreenCapture {
    settings: ScreenshotSection,
    binary: String,
    timeout: Duration,
}

impl ScreenCapture {
    pub fn new(settings: ScreenshotSection) -> Self {
        Self {
            settings,
            binary: "grim".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// 单次截屏的时限；超时后子进程随 future 一起被杀掉
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn is_png(&self) -> bool {
        self.settings.format.eq_ignore_ascii_case("png")
    }

    pub fn mime(&self) -> &'static str {
        if self.is_png() {
            "image/png"
        } else {
            "image/jpeg"
        }
    }

    pub fn extension(&self) -> &'static str {
        if self.is_png() {
            "png"
        } else {
            "jpg"
        }
    }

    /// grim 参数，图片写到 stdout
    pub fn args(&self, region: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        let scale = self.settings.scale;
        if scale > 0.0 && (scale - 1.0).abs() > f32::EPSILON {
            args.push("-s".to_string());
            args.push(scale.to_string());
        }
        if self.is_png() {
            args.push("-t".to_string());
            args.push("png".to_string());
        } else {
            args.push("-t".to_string());
            args.push("jpeg".to_string());
            args.push("-q".to_string());
            args.push(self.settings.quality.clamp(1, 100).to_string());
        }
        if let Some(region) = region.map(str::trim).filter(|r| !r.is_empty()) {
            args.push("-g".to_string());
            args.push(region.to_string());
        }
        args.push("-".to_string());
        args
    }

    /// 截屏；超时或超过 max_bytes 视为失败
    pub async fn capture(&self, region: Option<&str>) -> Result<ImageAttachment, String> {
        let args = self.args(region);
        let out = tokio::time::timeout(self.timeout, run_program(&self.binary, &args))
            .await
            .map_err(|_| format!("{} timed out after {:?}", self.binary, self.timeout))??;
        if out.stdout.is_empty() {
            return Err("screenshot produced no data".to_string());
        }
        if out.stdout.len() > self.settings.max_bytes {
            return Err(format!(
                "screenshot is {} bytes, limit is {}",
                out.stdout.len(),
                self.settings.max_bytes
            ));
        }
        Ok(ImageAttachment::new(self.mime(), out.stdout))
    }
}

pub struct ScreenshotHandler {
    capture: ScreenCapture,
    output_dir: PathBuf,
}

impl ScreenshotHandler {
    pub fn new(capture: ScreenCapture) -> Self {
        Self {
            capture,
            output_dir: std::env::temp_dir().join("hyprai"),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

#[async_trait]
impl ActionHandler for ScreenshotHandler {
    fn kinds(&self) -> &[ActionKind] {
        &[ActionKind::Screenshot]
    }

    fn description(&self) -> &str {
        "Capture the screen with grim"
    }

    async fn execute(&self, action: &Action) -> Result<Value, String> {
        let Action::Screenshot(params) = action else {
            return Err(format!("screenshot handler cannot run `{}`", action.kind()));
        };
        let image = self.capture.capture(params.region.as_deref()).await?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| format!("{}: {}", self.output_dir.display(), e))?;
        let name = format!(
            "screenshot-{}.{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S%.3f"),
            self.capture.extension()
        );
        let path = self.output_dir.join(name);
        tokio::fs::write(&path, &image.bytes)
            .await
            .map_err(|e| format!("{}: {}", path.display(), e))?;

        tracing::info!(path = %path.display(), bytes = image.bytes.len(), "screenshot saved");
        Ok(json!({
            "path": path.display().to_string(),
            "bytes": image.bytes.len(),
            "mime": image.mime,
        }))
    }
}
