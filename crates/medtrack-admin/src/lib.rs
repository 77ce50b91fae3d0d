//! # Medtrack管理模块
//!
//! 系统配置的加载与校验。

pub mod config;

pub use config::{
    ConfigManager, ConfigValidator, DatabaseConfig, DosesConfig, LoggingConfig, MedtrackConfig,
};
