/// 場景會話
///
/// 負責牆壁事件、發射源生命週期、每幀重算排程與迷霧持久化
pub mod core;
pub mod fog_manager;
pub mod initialization;
pub mod scheduler;
pub mod wall_events;


pub use self::core::{SceneSession, SweepJob, SweepResult, TickReport};
pub use fog_manager::{FogManager, FogStore, MemoryFogStore};
pub use initialization::SessionInitializer;
pub use scheduler::{Schedule, SweepScheduler};
pub use wall_events::{AppliedWalls, WallChange, WallData, WallEventApplier};
