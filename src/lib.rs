//! Projector Pose Calibration and Blending
//!
//! Core of a multi-projector projection mapping setup:
//! - Projector pose and lens estimation from 3D/2D point correspondences
//! - Asymmetric frustum projection with a principal point offset
//! - Soft-edge blend map accumulated across overlapping projectors
//! - Picking queries for placing calibration points

pub mod blending;
pub mod calibration;
pub mod config;
pub mod export;
pub mod picking;
pub mod projection;
pub mod projector;
pub mod render;
pub mod surface;
