pub mod asset_repository;
pub mod models;
