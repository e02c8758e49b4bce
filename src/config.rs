use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, PartialEq, Deserialize)]
pub struct Config {
    pub log_level: String,

    /// Connection string handed verbatim to every source backend at
    /// open time. Backends decide what, if anything, it means.
    #[serde(default)]
    pub conn_info: String,
}

impl Config {
    pub fn new(file: &str) -> Result<Config> {
        let mut cfg = config::Config::builder()
            .set_default("log_level", "debug")?
            .set_default("conn_info", "")?;
        if !file.is_empty() {
            cfg = cfg.add_source(config::File::with_name(file))
        }
        cfg = cfg.add_source(config::Environment::with_prefix("POLYSQL"));
        Ok(cfg.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() -> Result<()> {
        let cfg = Config::new("")?;
        assert_eq!("debug", cfg.log_level);
        assert_eq!("", cfg.conn_info);
        Ok(())
    }
}
