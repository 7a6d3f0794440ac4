pub mod domain;
pub mod inspect;
pub mod limits;
pub mod pipeline;
pub mod render;
pub mod traits;
