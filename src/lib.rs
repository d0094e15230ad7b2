pub mod archive;
pub mod calibration;
pub mod config;
pub mod context;
pub mod elo;
pub mod form;
pub mod games;
pub mod injuries;
pub mod league;
pub mod market;
pub mod opt;
pub mod outcomes;
pub mod persist;
pub mod slate;
pub mod weights;
pub mod win_prob;
