/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, anyhow};
use yaml_rust::{Yaml, yaml};

use super::DeltaStoreConfig;

impl DeltaStoreConfig {
    pub fn parse_yaml(v: &Yaml) -> anyhow::Result<Self> {
        if let Yaml::Hash(map) = v {
            let mut config = DeltaStoreConfig::default();
            foreach_kv(map, |k, v| config.set_by_yaml_kv(k, v))?;
            Ok(config)
        } else {
            Err(anyhow!(
                "yaml value type for 'delta store config' should be 'map'"
            ))
        }
    }

    fn set_by_yaml_kv(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match normalize_key(k).as_str() {
            "emit_first" => {
                self.emit_first = as_bool(v).context(format!("invalid bool value for key {k}"))?;
            }
            "expire" => {
                let expire = as_duration(v)
                    .context(format!("invalid humanize duration value for key {k}"))?;
                self.set_expire(expire);
            }
            _ => return Err(anyhow!("invalid key {k}")),
        }
        Ok(())
    }
}

fn normalize_key(raw: &str) -> String {
    raw.to_lowercase().replace('-', "_")
}

fn foreach_kv<F>(table: &yaml::Hash, mut f: F) -> anyhow::Result<()>
where
    F: FnMut(&str, &Yaml) -> anyhow::Result<()>,
{
    for (k, v) in table.iter() {
        if let Yaml::String(key) = k {
            f(key, v).context(format!("failed to parse value of key {key}"))?;
        } else {
            return Err(anyhow!("key in hash should be string"));
        }
    }
    Ok(())
}

fn as_bool(v: &Yaml) -> anyhow::Result<bool> {
    match v {
        Yaml::Boolean(value) => Ok(*value),
        Yaml::String(s) => match s.to_lowercase().as_str() {
            "on" | "true" | "yes" | "1" => Ok(true),
            "off" | "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!("invalid yaml string value for 'bool': {s}")),
        },
        Yaml::Integer(i) => Ok(*i != 0),
        _ => Err(anyhow!(
            "yaml value type for 'bool' should be 'boolean' / 'string' / 'integer'"
        )),
    }
}

fn as_duration(v: &Yaml) -> anyhow::Result<Duration> {
    match v {
        Yaml::String(value) => {
            // plain seconds, as integer or real
            if let Ok(secs) = u64::from_str(value) {
                Ok(Duration::from_secs(secs))
            } else if let Ok(f) = f64::from_str(value) {
                Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
            } else {
                humanize_rs::duration::parse(value)
                    .map_err(|e| anyhow!("invalid humanize duration string: {e}"))
            }
        }
        Yaml::Integer(value) => {
            let secs = u64::try_from(*value).map_err(|_| anyhow!("negative duration"))?;
            Ok(Duration::from_secs(secs))
        }
        Yaml::Real(s) => {
            let f = f64::from_str(s).map_err(|e| anyhow!("invalid f64 value: {e}"))?;
            Duration::try_from_secs_f64(f).map_err(anyhow::Error::new)
        }
        _ => Err(anyhow!(
            "yaml value type for humanize duration should be 'string' or 'integer' or 'real'"
        )),
    }
}
