use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use crate::position::AnchorPosition;

/// 引擎配置（由外部持久化，引擎只读）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 通知移动到的目标位置
    #[serde(default)]
    pub anchor: AnchorPosition,

    /// 与安全区边缘的间距（像素）
    #[serde(default = "default_padding")]
    pub padding: f64,

    /// 是否启用
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_padding() -> f64 {
    20.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            anchor: AnchorPosition::default(),
            padding: default_padding(),
            enabled: true,
        }
    }
}

/// 配置变更事件
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigEvent {
    PositionChanged(AnchorPosition),
    PaddingChanged(f64),
    EnabledChanged(bool),
}

impl EngineConfig {
    /// 指定位置使用的间距。目前所有位置一致，以后可按屏幕尺寸或 Dock 调整
    pub fn padding_for(&self, _anchor: AnchorPosition) -> f64 {
        self.padding.max(0.0)
    }

    /// 获取配置文件路径
    /// - macOS: ~/Library/Application Support/notimover/config.toml
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("无法获取配置目录")?
            .join("notimover");

        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;

        Ok(config_dir.join("config.toml"))
    }

    /// 从指定文件加载，如果文件不存在则写入并返回默认配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;

        let config: Self = toml::from_str(&content).with_context(|| "配置文件格式错误")?;

        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("配置序列化失败")?;

        fs::write(path, content)
            .with_context(|| format!("无法写入配置文件: {}", path.display()))?;

        log::debug!("配置已保存到: {}", path.display());
        Ok(())
    }

    /// 计算从 self 到 next 需要发出的变更事件
    pub fn diff(&self, next: &EngineConfig) -> Vec<ConfigEvent> {
        let mut events = Vec::new();
        if self.anchor != next.anchor {
            events.push(ConfigEvent::PositionChanged(next.anchor));
        }
        if self.padding != next.padding {
            events.push(ConfigEvent::PaddingChanged(next.padding));
        }
        if self.enabled != next.enabled {
            events.push(ConfigEvent::EnabledChanged(next.enabled));
        }
        events
    }
}

/// 注入给引擎的配置上下文：初始快照 + 变更通道
pub struct ConfigContext {
    pub snapshot: EngineConfig,
    pub events: Receiver<ConfigEvent>,
}

impl ConfigContext {
    /// 创建上下文，返回的 Sender 交给配置提供方
    pub fn channel(snapshot: EngineConfig) -> (Self, Sender<ConfigEvent>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                snapshot,
                events: rx,
            },
            tx,
        )
    }
}

/// 文件监听回退到轮询时的间隔
const POLL_FALLBACK_INTERVAL: Duration = Duration::from_millis(500);

/// 只关心目标文件的修改和创建（编辑器原子保存会表现为创建）
fn make_event_handler(
    filename: OsString,
    tx: Sender<()>,
) -> impl Fn(notify::Result<Event>) + Send + 'static {
    move |result: notify::Result<Event>| {
        let Ok(event) = result else {
            return;
        };
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let matches_config = event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(filename.as_os_str()));
        if matches_config {
            log::trace!("配置文件有变化");
            let _ = tx.send(());
        }
    }
}

/// 监听配置文件，变化时重新加载并发送差异事件
///
/// notify 回调只投递重新加载信号；读取文件、计算差异和发送事件都在
/// 调用 [`ConfigWatcher::poll`] 的线程上完成。
pub struct ConfigWatcher {
    path: PathBuf,
    current: EngineConfig,
    sender: Sender<ConfigEvent>,
    reloads: Receiver<()>,
    // 保持监听存活
    _watcher: Box<dyn Watcher + Send>,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, current: EngineConfig, sender: Sender<ConfigEvent>) -> Result<Self> {
        let filename = path
            .file_name()
            .context("配置路径没有文件名")?
            .to_os_string();
        let parent_dir = path
            .parent()
            .context("配置路径没有父目录")?
            .to_path_buf();

        let (tx, reloads) = mpsc::channel();
        let mut watcher = Self::create_watcher(filename, tx)?;
        watcher
            .watch(&parent_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("无法监听配置目录: {}", parent_dir.display()))?;

        log::info!("正在监听配置文件: {}", path.display());

        Ok(Self {
            path,
            current,
            sender,
            reloads,
            _watcher: watcher,
        })
    }

    /// 优先使用系统原生监听，失败时回退到按内容比较的轮询
    fn create_watcher(filename: OsString, tx: Sender<()>) -> Result<Box<dyn Watcher + Send>> {
        match notify::recommended_watcher(make_event_handler(filename.clone(), tx.clone())) {
            Ok(w) => Ok(Box::new(w)),
            Err(e) => {
                log::warn!("原生文件监听不可用 ({})，改用轮询", e);
                let poll_watcher = PollWatcher::new(
                    make_event_handler(filename, tx),
                    NotifyConfig::default()
                        .with_poll_interval(POLL_FALLBACK_INTERVAL)
                        .with_compare_contents(true),
                )
                .context("无法创建轮询文件监听")?;
                Ok(Box::new(poll_watcher))
            }
        }
    }

    pub fn current(&self) -> &EngineConfig {
        &self.current
    }

    /// 处理积压的变化信号，多个信号合并为一次重新加载。返回发出的事件数
    pub fn poll(&mut self) -> usize {
        if self.reloads.try_iter().count() == 0 {
            return 0;
        }
        self.reload()
    }

    /// 立即按文件内容重新加载，返回发出的事件数
    ///
    /// 文件格式错误时保留当前配置。
    pub fn reload(&mut self) -> usize {
        let next = match fs::read_to_string(&self.path)
            .map_err(anyhow::Error::from)
            .and_then(|content| toml::from_str::<EngineConfig>(&content).map_err(Into::into))
        {
            Ok(config) => config,
            Err(e) => {
                log::warn!("重新加载配置失败，保留当前配置: {}", e);
                return 0;
            }
        };

        let events = self.current.diff(&next);
        for event in &events {
            log::info!("配置变更: {:?}", event);
            if self.sender.send(event.clone()).is_err() {
                log::debug!("配置事件接收方已关闭");
            }
        }
        self.current = next;
        events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.anchor, AnchorPosition::TopRight);
        assert_eq!(config.padding, 20.0);
        assert!(config.enabled);
        assert_eq!(config.padding_for(AnchorPosition::BottomLeft), 20.0);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EngineConfig = toml::from_str("anchor = \"bottom-left\"").unwrap();
        assert_eq!(config.anchor, AnchorPosition::BottomLeft);
        assert_eq!(config.padding, 20.0);
        assert!(config.enabled);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = EngineConfig {
            anchor: AnchorPosition::BottomRight,
            padding: 32.0,
            enabled: false,
        };
        config.save_to(&path).unwrap();
        assert_eq!(EngineConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_diff() {
        let old = EngineConfig::default();
        let new = EngineConfig {
            anchor: AnchorPosition::TopLeft,
            padding: 20.0,
            enabled: false,
        };
        assert_eq!(
            old.diff(&new),
            vec![
                ConfigEvent::PositionChanged(AnchorPosition::TopLeft),
                ConfigEvent::EnabledChanged(false),
            ]
        );
        assert!(old.diff(&old).is_empty());
    }

    fn watched_config() -> (tempfile::TempDir, PathBuf, ConfigContext, ConfigWatcher) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let initial = EngineConfig::load_from(&path).unwrap();
        let (ctx, tx) = ConfigContext::channel(initial.clone());
        let watcher = ConfigWatcher::new(path.clone(), initial, tx).unwrap();
        (dir, path, ctx, watcher)
    }

    #[test]
    fn test_watcher_has_no_initial_events() {
        let (_dir, _path, ctx, mut watcher) = watched_config();
        assert_eq!(watcher.poll(), 0);
        assert!(ctx.events.try_recv().is_err());
    }

    #[test]
    fn test_watcher_requires_parent_directory() {
        let (tx, _rx) = mpsc::channel();
        let path = PathBuf::from("/nonexistent_notimover_dir/config.toml");
        assert!(ConfigWatcher::new(path, EngineConfig::default(), tx).is_err());
    }

    #[test]
    fn test_watcher_detects_file_change() {
        let (_dir, path, ctx, mut watcher) = watched_config();
        std::thread::sleep(Duration::from_millis(100));

        fs::write(&path, "anchor = \"bottom-right\"\npadding = 8.0\n").unwrap();

        // 原生监听通常很快，回退轮询最多 500ms
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        let mut sent = 0;
        while sent < 2 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
            sent += watcher.poll();
        }
        assert_eq!(sent, 2);

        let events: Vec<ConfigEvent> = ctx.events.try_iter().collect();
        assert_eq!(
            events,
            vec![
                ConfigEvent::PositionChanged(AnchorPosition::BottomRight),
                ConfigEvent::PaddingChanged(8.0),
            ]
        );
        assert_eq!(watcher.current().padding, 8.0);
    }

    #[test]
    fn test_reload_compares_content_not_mtime() {
        let (_dir, path, ctx, mut watcher) = watched_config();
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        fs::write(&path, "anchor = \"bottom-left\"\n").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(before)
            .unwrap();

        assert_eq!(watcher.reload(), 1);
        assert_eq!(
            ctx.events.try_recv().unwrap(),
            ConfigEvent::PositionChanged(AnchorPosition::BottomLeft)
        );
        assert_eq!(watcher.current().anchor, AnchorPosition::BottomLeft);
        // 内容没变时不重复发送
        assert_eq!(watcher.reload(), 0);
    }

    #[test]
    fn test_watcher_ignores_malformed_file() {
        let (_dir, path, ctx, mut watcher) = watched_config();
        let initial = watcher.current().clone();

        fs::write(&path, "anchor = [").unwrap();
        assert_eq!(watcher.reload(), 0);
        assert_eq!(watcher.current(), &initial);
        assert!(ctx.events.try_recv().is_err());
    }
}
