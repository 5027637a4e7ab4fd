//! Core domain types
//!
//! This module contains the structures shared by the watcher, the
//! formatter and the correlator. These types carry no I/O; the cluster and
//! messaging adapters convert their wire shapes into them.

pub mod activity;
pub mod event;
pub mod notification;
pub mod source_config;
pub mod user;
