mod config;
mod on_demand;
mod pipeline;
