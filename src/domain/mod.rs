// Domain layer: core models and ports (interfaces). No I/O beyond the trait seams.

pub mod model;
pub mod ports;
pub mod table;
