pub mod error;

pub mod row;
pub mod value;

pub mod sql;

pub mod config;
pub mod exec;
pub mod source;
