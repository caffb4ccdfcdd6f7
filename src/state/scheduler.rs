/// 重算排程器
///
/// 每個 tick 只重算預算內的發射源，依優先度排序；
/// 被延後的發射源每等一個 tick 優先度加一，避免永遠輪不到。
use hashbrown::HashMap;

use crate::comp::emitter::EmitterId;
use crate::config::BudgetSetting;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Schedule {
    /// 本 tick 要重算的發射源（依 id 排序）
    pub run: Vec<EmitterId>,
    /// 延到之後的發射源
    pub deferred: Vec<EmitterId>,
}

#[derive(Debug)]
pub struct SweepScheduler {
    max_per_tick: usize,
    /// 已等待的 tick 數
    waiting: HashMap<EmitterId, i64>,
}

impl SweepScheduler {
    pub fn new(setting: &BudgetSetting) -> Self {
        Self {
            max_per_tick: setting.max_sweeps_per_tick,
            waiting: HashMap::new(),
        }
    }

    /// 0 表示不限制
    pub fn budget(&self) -> usize {
        self.max_per_tick
    }

    pub fn plan(&mut self, dirty: &[(EmitterId, i32)]) -> Schedule {
        let mut ordered: Vec<(i64, EmitterId)> = dirty
            .iter()
            .map(|(id, priority)| (*priority as i64 + self.waiting.get(id).copied().unwrap_or(0), *id))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let limit = if self.max_per_tick == 0 { ordered.len() } else { self.max_per_tick };
        let mut schedule = Schedule::default();
        for (i, (_, id)) in ordered.into_iter().enumerate() {
            if i < limit {
                self.waiting.remove(&id);
                schedule.run.push(id);
            } else {
                *self.waiting.entry(id).or_insert(0) += 1;
                schedule.deferred.push(id);
            }
        }
        schedule.run.sort_unstable();
        schedule
    }

    /// 發射源被移除時清掉等待記錄
    pub fn forget(&mut self, id: EmitterId) {
        self.waiting.remove(&id);
    }

    pub fn waiting_ticks(&self, id: EmitterId) -> i64 {
        self.waiting.get(&id).copied().unwrap_or(0)
    }
}
