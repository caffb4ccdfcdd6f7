/// 視野引擎錯誤類型
///
/// 所有錯誤都在子系統內部被回收：幾何錯誤在單一發射源內處理，
/// 持久化錯誤在場景會話邊界處理，不會傳到渲染循環。
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VisionError {
    /// 牆壁/頂點資料不合法（零長度、NaN 等），該邊會被丟棄
    #[error("configuration error: {0}")]
    Configuration(String),
    /// 數值退化（例如半徑為零的發射源），結果退化為空多邊形
    #[error("computation error: {0}")]
    Computation(String),
    /// 迷霧資料讀寫失敗，視為未探索或跳過本次存檔
    #[error("persistence error: {0}")]
    Persistence(String),
    /// 超出每幀預算，只會以效能警告呈現
    #[error("capacity exceeded: {0}")]
    Capacity(String),
}

impl VisionError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            VisionError::Configuration(_) => "configuration",
            VisionError::Computation(_) => "computation",
            VisionError::Persistence(_) => "persistence",
            VisionError::Capacity(_) => "capacity",
        }
    }
}

pub type VisionResult<T> = Result<T, VisionError>;
