//! Herald Core
//!
//! Core types for the Herald pipeline notification bot.
//!
//! This crate contains:
//! - Domain types: pipeline activities, resolved users, notification records
//!   and the per-repository notification settings
//! - DTOs: wire shapes for the cluster API and the messaging platform

pub mod domain;
pub mod dto;
