pub mod battle_repo;
pub mod campaign_repo;
pub mod models;
pub mod unit_repo;
