//! Filters
//!
//! - [`ekf::ExtendedKalmanFilter`]: square-root Extended Kalman Filter over a
//!   [`crate::models::Simulator`], with backward trajectory sampling
//! - [`kalman::KalmanFilter`]: dense covariance-form Kalman filter and RTS
//!   smoother for linear-Gaussian models

pub mod ekf;
pub mod kalman;
