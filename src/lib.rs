pub mod api;
pub mod appstate;
pub mod chart;
pub mod config;
pub mod error;
pub mod factory;
pub mod server;
pub mod swarm;
pub mod swarm_form;
pub mod tabs;
pub mod testruns;
pub mod utils;
