use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use loadr_core::{Check, HttpRequest, Method, ScenarioOptions, StaticScenario, Step};
use serde::Deserialize;

/// Scenario file as written on disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct ScenarioYaml {
    pub name: Option<String>,
    pub vus: Option<u64>,
    pub iterations: Option<u64>,

    #[serde(default)]
    pub duration: Option<YamlDuration>,
    #[serde(default)]
    pub think_time: Option<YamlDuration>,
    /// Default per-request timeout.
    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    #[serde(default)]
    pub requests: Vec<RequestYaml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct RequestYaml {
    pub name: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,

    /// Sent in file order.
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: Vec<(String, String)>,

    pub body: Option<String>,
    pub json: Option<serde_json::Value>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    #[serde(default)]
    pub checks: Vec<CheckYaml>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub name: Option<String>,
    pub status: Option<StatusYaml>,
    pub body_contains: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum StatusYaml {
    One(u16),
    Many(Vec<u16>),
}

impl StatusYaml {
    fn into_codes(self) -> Vec<u16> {
        match self {
            Self::One(code) => vec![code],
            Self::Many(codes) => codes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration cannot be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a non-negative, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = serde_yaml::Mapping::deserialize(deserializer)?;
    let mut out = Vec::with_capacity(raw.len());

    for (k, v) in raw {
        let serde_yaml::Value::String(name) = k else {
            return Err(D::Error::custom("header names must be strings"));
        };
        let value = match v {
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(D::Error::custom(format!(
                    "header `{name}` must be a string, number, or bool"
                )));
            }
        };
        out.push((name, value));
    }

    Ok(out)
}

/// Replaces `${NAME}` and `${NAME:-default}` with values from `env`.
///
/// A placeholder without a default whose variable is unset is an error.
pub(crate) fn interpolate(input: &str, env: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("unterminated `${{` in `{input}`"))?;

        let expr = &after[..end];
        let (name, default) = match expr.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (expr, None),
        };
        if name.is_empty() {
            anyhow::bail!("empty variable name in `{input}`");
        }

        match (env.get(name), default) {
            (Some(v), _) => out.push_str(v),
            (None, Some(default)) => out.push_str(default),
            (None, None) => anyhow::bail!("environment variable `{name}` is not set"),
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn interpolate_json(
    value: serde_json::Value,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match value {
        Value::String(s) => Value::String(interpolate(&s, env)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| interpolate_json(v, env))
                .collect::<anyhow::Result<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| Ok((k, interpolate_json(v, env)?)))
                .collect::<anyhow::Result<_>>()?,
        ),
        other => other,
    })
}

/// A scenario file resolved against the environment.
#[derive(Debug, Clone)]
pub(crate) struct LoadedScenario {
    pub options: ScenarioOptions,
    pub scenario: StaticScenario,
}

pub(crate) async fn load_scenario_from_yaml(
    path: &Path,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<LoadedScenario> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read scenario YAML: {}", path.display()))?;

    let doc: ScenarioYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("main")
        .to_string();

    resolve(doc, default_name, env)
        .with_context(|| format!("invalid scenario: {}", path.display()))
}

fn resolve(
    doc: ScenarioYaml,
    default_name: String,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<LoadedScenario> {
    let ScenarioYaml {
        name,
        vus,
        iterations,
        duration,
        think_time,
        timeout,
        requests,
    } = doc;

    let steps = requests
        .into_iter()
        .enumerate()
        .map(|(idx, req)| {
            step_from_yaml(req, env).with_context(|| format!("requests[{idx}]"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let options = ScenarioOptions {
        name: Some(name.unwrap_or(default_name)),
        vus,
        duration: duration.map(YamlDuration::into_inner),
        think_time: think_time.map(YamlDuration::into_inner),
        request_timeout: timeout.map(YamlDuration::into_inner),
        iterations,
    };

    Ok(LoadedScenario {
        options,
        scenario: StaticScenario::new(steps)?,
    })
}

fn step_from_yaml(req: RequestYaml, env: &BTreeMap<String, String>) -> anyhow::Result<Step> {
    let RequestYaml {
        name,
        method,
        url,
        headers,
        body,
        json,
        timeout,
        checks,
    } = req;

    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method `{method}`"))?;
    let url = interpolate(&url, env)?;

    let mut request = HttpRequest::new(method, url);
    for (k, v) in headers {
        request = request.with_header(k, interpolate(&v, env)?);
    }

    match (body, json) {
        (Some(_), Some(_)) => anyhow::bail!("`body` and `json` are mutually exclusive"),
        (Some(body), None) => {
            request = request.with_body(interpolate(&body, env)?);
        }
        (None, Some(json)) => {
            let json = interpolate_json(json, env)?;
            let encoded = serde_json::to_vec(&json).context("failed to encode `json` body")?;
            if !request
                .headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            {
                request = request.with_header("Content-Type", "application/json");
            }
            request = request.with_body(encoded);
        }
        (None, None) => {}
    }

    if let Some(timeout) = timeout {
        let timeout = timeout.into_inner();
        if timeout.is_zero() {
            anyhow::bail!("`timeout` must be a positive duration");
        }
        request = request.with_timeout(timeout);
    }

    let mut step = Step::new(request);
    if let Some(name) = name {
        step = step.named(name);
    }
    for (idx, check) in checks.into_iter().enumerate() {
        step = step.check(check_from_yaml(check).with_context(|| format!("checks[{idx}]"))?);
    }

    Ok(step)
}

fn check_from_yaml(check: CheckYaml) -> anyhow::Result<Check> {
    match (check.status, check.body_contains) {
        (Some(status), None) => {
            let codes = status.into_codes();
            if codes.is_empty() {
                anyhow::bail!("`status` must list at least one code");
            }
            let name = check.name.unwrap_or_else(|| {
                let list = codes
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(" or ");
                format!("status was {list}")
            });
            Ok(Check::status_in(name, codes))
        }
        (None, Some(needle)) => {
            let name = check
                .name
                .unwrap_or_else(|| format!("body contains {needle:?}"));
            Ok(Check::body_contains(name, needle))
        }
        (Some(_), Some(_)) => {
            anyhow::bail!("a check takes either `status` or `bodyContains`, not both")
        }
        (None, None) => anyhow::bail!("a check needs `status` or `bodyContains`"),
    }
}
