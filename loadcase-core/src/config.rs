use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use loadcase_value::{Value, Variables, merge_variables};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::params::{ParameterIterator, ParametersSetting};
use crate::step::Step;

/// Scenario configuration as produced by the definition layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioOptions {
    pub name: String,

    /// Relative weight against other scenarios of the same load test. Defaults to 1.
    pub weight: Option<i64>,

    pub variables: BTreeMap<String, Value>,

    /// Parameter data, `name -> list`. Joined names (`a-b`) bind several columns per row.
    pub parameters: BTreeMap<String, Value>,

    pub parameters_setting: ParametersSetting,
}

/// A scenario definition: options plus its ordered steps.
#[derive(Debug, Clone)]
pub struct ScenarioDefinition {
    pub options: ScenarioOptions,
    pub steps: Vec<Step>,
}

impl ScenarioDefinition {
    #[must_use]
    pub fn new(options: ScenarioOptions, steps: Vec<Step>) -> Self {
        Self { options, steps }
    }

    pub fn into_config(self) -> Result<ScenarioConfig> {
        scenario_from_options(self.options, self.steps)
    }
}

/// Validated, immutable scenario template shared by all runs of the scenario.
#[derive(Debug)]
pub struct ScenarioConfig {
    pub name: Arc<str>,
    pub weight: u32,
    pub steps: Arc<[Step]>,
    pub variables: Variables,
    pub parameters: Option<Arc<ParameterIterator>>,
}

impl ScenarioConfig {
    /// Fresh variables for one run: a private copy of the template's variables with the next
    /// parameter binding (if any remain) merged over them.
    #[must_use]
    pub fn instance_variables(&self) -> Variables {
        match self.parameters.as_deref().and_then(ParameterIterator::next) {
            Some(binding) => merge_variables(&binding, &self.variables),
            None => self.variables.clone(),
        }
    }
}

pub fn scenario_from_options(opts: ScenarioOptions, steps: Vec<Step>) -> Result<ScenarioConfig> {
    let name = opts.name.trim();
    if name.is_empty() {
        return Err(Error::EmptyScenarioName);
    }

    let weight = match opts.weight {
        None => 1,
        Some(w) => u32::try_from(w)
            .ok()
            .filter(|w| *w > 0)
            .ok_or_else(|| Error::InvalidWeight {
                scenario: name.to_string(),
            })?,
    };

    if steps.is_empty() {
        return Err(Error::NoSteps {
            scenario: name.to_string(),
        });
    }

    let parameters = ParameterIterator::from_setting(&opts.parameters, &opts.parameters_setting)
        .map_err(|source| Error::Parameters {
            scenario: name.to_string(),
            source,
        })?;

    let variables: Variables = opts
        .variables
        .into_iter()
        .map(|(k, v)| (Arc::<str>::from(k), v))
        .collect();

    Ok(ScenarioConfig {
        name: Arc::from(name),
        weight,
        steps: Arc::from(steps),
        variables,
        parameters: parameters.map(Arc::new),
    })
}

/// Options for the bundled standalone engine.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub workers: Option<u64>,
    pub iterations: Option<u64>,
    pub duration: Option<ConfigDuration>,
}

/// Duration accepted as a humantime string (`10s`), integer seconds, or float seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDuration(Duration);

impl ConfigDuration {
    #[must_use]
    pub fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for ConfigDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = ConfigDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ConfigDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| ConfigDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration must be >= 0"))
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(ConfigDuration)
                    .map_err(|_| E::custom("duration must be a finite number >= 0"))
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                humantime::parse_duration(v.trim())
                    .map(ConfigDuration)
                    .map_err(|e| E::custom(format!("invalid duration `{v}`: {e}")))
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepError, StepReport, from_fn};

    fn noop_step() -> Step {
        Step::request(
            "noop",
            from_fn(|_| async { Ok::<_, StepError>(StepReport::default()) }),
        )
    }

    fn options(json: &str) -> ScenarioOptions {
        serde_json::from_str(json).unwrap_or_else(|e| panic!("expected valid options: {e}"))
    }

    #[test]
    fn defaults_weight_to_one() {
        let cfg = scenario_from_options(options(r#"{"name": "browse"}"#), vec![noop_step()])
            .unwrap_or_else(|e| panic!("expected valid scenario: {e}"));
        assert_eq!(cfg.name.as_ref(), "browse");
        assert_eq!(cfg.weight, 1);
        assert!(cfg.parameters.is_none());
    }

    #[test]
    fn rejects_invalid_configuration() {
        let cases = [
            (r#"{"name": "  "}"#, "scenario name must not be empty"),
            (
                r#"{"name": "s", "weight": 0}"#,
                "scenario `s`: `weight` must be a positive integer",
            ),
            (
                r#"{"name": "s", "weight": -3}"#,
                "scenario `s`: `weight` must be a positive integer",
            ),
            (
                r#"{"name": "s", "parameters": {"user": "alice"}}"#,
                "scenario `s`: parameter `user` must be a list",
            ),
        ];

        for (json, expected) in cases {
            match scenario_from_options(options(json), vec![noop_step()]) {
                Err(err) => assert_eq!(err.to_string(), expected),
                Ok(_) => panic!("expected error for {json}"),
            }
        }

        match scenario_from_options(options(r#"{"name": "empty"}"#), vec![]) {
            Err(Error::NoSteps { scenario }) => assert_eq!(scenario, "empty"),
            other => panic!("expected NoSteps, got {other:?}"),
        }
    }

    #[test]
    fn instance_variables_prefer_parameter_bindings() {
        let cfg = scenario_from_options(
            options(
                r#"{
                    "name": "login",
                    "variables": {"user": "default", "host": "example.test"},
                    "parameters": {"user": ["alice"]}
                }"#,
            ),
            vec![noop_step()],
        )
        .unwrap_or_else(|e| panic!("expected valid scenario: {e}"));

        let first = cfg.instance_variables();
        assert_eq!(first.get("user"), Some(&Value::from("alice")));
        assert_eq!(first.get("host"), Some(&Value::from("example.test")));

        // Exhausted: the run keeps the template's own bindings.
        let second = cfg.instance_variables();
        assert_eq!(second.get("user"), Some(&Value::from("default")));

        // The template itself is never touched.
        assert_eq!(cfg.variables.get("user"), Some(&Value::from("default")));
    }

    #[test]
    fn engine_options_parse_durations() {
        let opts: EngineOptions =
            serde_json::from_str(r#"{"workers": 4, "duration": "1m 30s"}"#)
                .unwrap_or_else(|e| panic!("expected valid options: {e}"));
        assert_eq!(opts.workers, Some(4));
        assert_eq!(
            opts.duration.map(ConfigDuration::into_inner),
            Some(Duration::from_secs(90))
        );

        let opts: EngineOptions = serde_json::from_str(r#"{"duration": 2.5}"#)
            .unwrap_or_else(|e| panic!("expected valid options: {e}"));
        assert_eq!(
            opts.duration.map(ConfigDuration::into_inner),
            Some(Duration::from_millis(2500))
        );

        assert!(serde_json::from_str::<EngineOptions>(r#"{"duration": "soon"}"#).is_err());
    }
}
