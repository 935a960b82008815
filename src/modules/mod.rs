pub mod agent;
pub mod arena;
pub mod budget;
pub mod config;
pub mod controller;
pub mod decision;
pub mod economy;
pub mod error;
pub mod formation;
pub mod geometry;
pub mod message;
pub mod pathing;
pub mod phase;
pub mod report;
pub mod table;
#[cfg(test)]
pub mod testing;
pub mod threat;
pub mod worker;
pub mod world;
