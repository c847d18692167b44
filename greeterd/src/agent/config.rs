use std::collections::HashMap;

use figment::providers::Env;

const ENV_PREFIX: &str = "NEW_RELIC_";
const KEY_PREFIX: &str = "newrelic.config.";

/// Agent settings captured from the environment.
///
/// Keys follow the agent's convention: `newrelic.config.app_name` and
/// `app_name` both resolve to `NEW_RELIC_APP_NAME`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfig {
    values: HashMap<String, String>,
}

impl AgentConfig {
    /// Reads every `NEW_RELIC_*` variable. Variables whose name or value is
    /// not valid Unicode are skipped.
    pub fn from_env() -> Self {
        Self::from_provider(&Env::prefixed(ENV_PREFIX))
    }

    /// Env keys come back with the prefix stripped and lowercased.
    fn from_provider(env: &Env) -> Self {
        let values = env
            .iter()
            .map(|(key, value)| (key.as_str().to_ascii_lowercase(), value))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&setting_name(key)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds a config from `(variable, value)` pairs, as found in the
/// environment.
impl<K, V> FromIterator<(K, V)> for AgentConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let values = iter
            .into_iter()
            .filter_map(|(k, v)| {
                let k = k.into();
                let name = k.strip_prefix(ENV_PREFIX)?.to_ascii_lowercase();
                Some((name, v.into()))
            })
            .collect();
        Self { values }
    }
}

/// `newrelic.config.distributed_tracing.enabled` -> `distributed_tracing_enabled`,
/// the variable name below `NEW_RELIC_` in lowercase.
fn setting_name(key: &str) -> String {
    let key = key.strip_prefix(KEY_PREFIX).unwrap_or(key);
    key.replace('.', "_").to_ascii_lowercase()
}
