pub mod covariance;
pub mod frontier;
pub mod orchestrator;
pub mod qp;
pub mod statistics;
pub mod weights;
