#![allow(unexpected_cfgs)]

use anyhow::Result;
use std::net::TcpListener;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 使用 TCP 端口锁实现单实例检测
fn try_lock_single_instance() -> bool {
    match TcpListener::bind("127.0.0.1:57833") {
        Ok(listener) => {
            // 泄露到堆上，进程退出前一直持有端口
            Box::leak(Box::new(listener));
            true
        }
        Err(_) => false,
    }
}

#[cfg(target_os = "macos")]
mod run {
    use anyhow::{Context, Result};
    use std::time::{Duration, Instant};

    use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopRunResult};
    use notimover_core::config::{ConfigContext, ConfigWatcher, EngineConfig};
    use notimover_core::engine::{Engine, EngineSettings};
    use notimover_platform::macos::MacPlatform;
    use notimover_platform::PermissionChecker;

    /// 每次让 RunLoop 处理事件的最长时间，也决定了 tick 的粒度
    const LOOP_SLICE: Duration = Duration::from_millis(10);
    const PERMISSION_POLL: Duration = Duration::from_secs(1);

    /// 等待辅助功能权限；返回是否经过了等待
    fn wait_for_permission(platform: &MacPlatform) -> Result<bool> {
        if platform.check_permissions() {
            return Ok(false);
        }

        log::warn!("缺少辅助功能权限，正在触发系统授权提示...");
        platform
            .request_permissions()
            .context("请求辅助功能权限失败")?;

        while !platform.check_permissions() {
            std::thread::sleep(PERMISSION_POLL);
        }
        log::info!("已获得辅助功能权限");
        Ok(true)
    }

    pub fn run() -> Result<()> {
        let path = EngineConfig::config_path()?;
        let config = EngineConfig::load_from(&path).context("加载配置失败")?;
        log::info!("配置已加载: {:?}", config);

        let platform = notimover_platform::create_platform();
        let waited = wait_for_permission(&platform)?;

        let (context, sender) = ConfigContext::channel(config.clone());
        let mut watcher = match ConfigWatcher::new(path, config.clone(), sender) {
            Ok(w) => Some(w),
            Err(e) => {
                log::warn!("无法监听配置文件，配置修改需重启生效: {:?}", e);
                None
            }
        };
        let mut engine = Engine::new(platform, context, EngineSettings::default());

        if config.enabled {
            engine.start();
            if waited {
                // 等待授权期间出现的通知也要处理
                engine.move_all(Instant::now());
            }
        } else {
            log::info!("通知定位已禁用，等待配置启用");
        }

        let mode = unsafe { kCFRunLoopDefaultMode };
        loop {
            // 让 AXObserver 回调有机会执行
            let result = CFRunLoop::run_in_mode(mode, LOOP_SLICE, true);
            if matches!(result, CFRunLoopRunResult::Finished) {
                // 还没有任何订阅时 RunLoop 会立即返回
                std::thread::sleep(LOOP_SLICE);
            }

            if let Some(watcher) = watcher.as_mut() {
                watcher.poll();
            }
            engine.tick(Instant::now());
        }
    }
}

fn inner_main() -> Result<()> {
    if !try_lock_single_instance() {
        log::warn!("程序已在运行中，退出");
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        run::run()?;
    }

    #[cfg(not(target_os = "macos"))]
    {
        log::error!("当前平台不受支持，仅支持 macOS");
    }

    Ok(())
}

fn main() {
    let temp_dir = std::env::temp_dir();
    let run_log_path = temp_dir.join("notimover_run.log");
    let err_log_path = temp_dir.join("notimover_fatal_err.log");

    // 日志写入文件，方便后台运行时调试
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    match std::fs::File::create(&run_log_path) {
        Ok(log_file) => {
            builder.target(env_logger::Target::Pipe(Box::new(log_file)));
        }
        Err(e) => eprintln!("无法创建日志文件 {}: {}", run_log_path.display(), e),
    }
    builder.init();

    log::info!("NotiMover v{} 启动中...", APP_VERSION);

    if let Err(e) = inner_main() {
        log::error!("致命错误导致应用退出: {:?}", e);
        std::fs::write(&err_log_path, format!("{:?}", e)).ok();
    }
}
