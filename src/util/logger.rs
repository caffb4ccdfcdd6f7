/// 日誌初始化
use log::LevelFilter;

use crate::error::VisionError;

/// 安裝 stdout 日誌輸出；嵌入端已有 logger 時不需呼叫
pub fn setup_logger(level: LevelFilter) -> Result<(), VisionError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
        .map_err(|e| VisionError::Configuration(format!("logger already installed: {}", e)))
}
