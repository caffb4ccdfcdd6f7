/// 資料元件：牆壁、頂點、發射源、偵測模式與迷霧記錄
pub mod detection;
pub mod edge;
pub mod emitter;
pub mod fog;
pub mod vertex;

#[cfg(test)]
mod edge_tests;

pub use self::{
    detection::*,
    edge::*,
    emitter::*,
    fog::*,
    vertex::*,
};
