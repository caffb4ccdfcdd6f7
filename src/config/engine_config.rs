use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::VisionError;

/// 四叉樹參數
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct QuadTreeSetting {
    /// 節點物件數超過此值時細分
    pub max_objects: usize,
    /// 節點最小邊長，小於此值不再細分
    pub min_node_size: f64,
    pub max_depth: usize,
}

impl Default for QuadTreeSetting {
    fn default() -> Self {
        Self {
            max_objects: 8,
            min_node_size: 32.0,
            max_depth: 10,
        }
    }
}

/// 掃描參數
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SweepSetting {
    /// 完整圓周的取樣段數
    pub arc_segments: usize,
    /// 單次掃描最多考慮的候選邊數
    pub max_candidate_edges: usize,
    /// 是否以執行緒池平行掃描
    pub parallel: bool,
    /// 執行緒數，0 表示使用 CPU 核心數
    pub threads: usize,
}

impl Default for SweepSetting {
    fn default() -> Self {
        Self {
            arc_segments: 72,
            max_candidate_edges: 2048,
            parallel: true,
            threads: 0,
        }
    }
}

/// 每幀預算
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BudgetSetting {
    /// 每個 tick 最多重算的發射源數量
    pub max_sweeps_per_tick: usize,
}

impl Default for BudgetSetting {
    fn default() -> Self {
        Self {
            max_sweeps_per_tick: 64,
        }
    }
}

/// 戰爭迷霧參數
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct FogSetting {
    /// 探索遮罩每格大小
    pub cell_size: f64,
    /// 兩次存檔之間的最短間隔（毫秒）
    pub save_interval_ms: i64,
}

impl Default for FogSetting {
    fn default() -> Self {
        Self {
            cell_size: 25.0,
            save_interval_ms: 2000,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LogSetting {
    pub level: String,
}

impl Default for LogSetting {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogSetting {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// 引擎總設定
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct EngineSetting {
    pub quadtree: QuadTreeSetting,
    pub sweep: SweepSetting,
    pub budget: BudgetSetting,
    pub fog: FogSetting,
    pub log: LogSetting,
}

impl EngineSetting {
    pub fn from_toml_str(text: &str) -> Result<Self, VisionError> {
        toml::from_str(text)
            .map_err(|e| VisionError::Configuration(format!("invalid engine setting: {}", e)))
    }

    /// 從 TOML 檔讀取設定
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            VisionError::Configuration(format!("no such file {}: {}", path.display(), e))
        })?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val).map_err(|e| {
            VisionError::Configuration(format!("error reading {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&str_val)
    }
}
