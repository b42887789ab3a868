pub mod adapter;
pub mod annotate;
pub mod backends;
pub mod draw;
pub mod prediction;
pub mod yolo;
