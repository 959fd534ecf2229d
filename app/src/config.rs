use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Directory holding the JSON job database.
    #[serde(default = "ControlConfig::default_data_dir")]
    pub data_dir: String,

    /// Which executor backend to register: `kubernetes` or `basic`.
    #[serde(default = "ControlConfig::default_executor")]
    pub executor: String,

    #[serde(default = "Default::default")]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduling ticks; at most one job is dispatched per
    /// tick.
    #[serde(default = "SchedulerConfig::default_tick_interval")]
    pub tick_interval: u64,
}

impl ControlConfig {
    pub fn default_data_dir() -> String {
        ".".to_owned()
    }

    pub fn default_executor() -> String {
        "kubernetes".to_owned()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Self::default_tick_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn default_tick_interval() -> u64 {
        5
    }
}

pub fn build_config() -> anyhow::Result<ControlConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix("CONTROL").separator("__"))
        .build()?;
    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let config = config::Config::builder().build().unwrap();
        let config: ControlConfig = config.try_deserialize().unwrap();
        assert_eq!(config.data_dir, ".");
        assert_eq!(config.executor, "kubernetes");
        assert_eq!(config.scheduler.tick_interval, 5);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let config = config::Config::builder()
            .add_source(config::File::from_str(
                "executor: basic\nscheduler:\n  tick_interval: 1\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap();
        let config: ControlConfig = config.try_deserialize().unwrap();
        assert_eq!(config.executor, "basic");
        assert_eq!(config.scheduler.tick_interval, 1);
    }
}
