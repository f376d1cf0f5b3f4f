use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use barrage_core::HttpClientConfig;
use barrage_core::runner::{
    Check, HttpScenario, NamedCheck, Predicate, RequestTemplate, RunOptions, Stage, StatusRange,
    ThresholdRule, ThresholdSet,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigYaml {
    /// Scenario name (metrics `scenario` tag); defaults to the file stem.
    pub name: Option<String>,

    pub vus: Option<u64>,

    #[serde(default)]
    pub duration: Option<YamlDuration>,

    pub start_vus: Option<u64>,

    #[serde(default)]
    pub stages: Option<Vec<StageYaml>>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, ThresholdsYaml>,

    pub request: RequestYaml,

    #[serde(default)]
    pub checks: Vec<CheckYaml>,

    /// Think time after each iteration.
    #[serde(default)]
    pub sleep: Option<YamlDuration>,

    #[serde(default)]
    pub graceful_stop: Option<YamlDuration>,

    #[serde(default)]
    pub tick: Option<YamlDuration>,

    #[serde(default)]
    pub http: HttpYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct StageYaml {
    pub duration: YamlDuration,
    pub target: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RequestYaml {
    #[serde(default = "default_method")]
    pub method: String,
    pub url: String,

    #[serde(default, deserialize_with = "deserialize_scalar_map")]
    pub headers: BTreeMap<String, String>,

    pub body: Option<String>,

    #[serde(default)]
    pub timeout: Option<YamlDuration>,

    /// Value of the `name` tag on request metrics.
    pub name: Option<String>,

    pub expected_statuses: Option<Vec<StatusYaml>>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// `200` or `[200, 399]`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub(crate) enum StatusYaml {
    One(u16),
    Range([u16; 2]),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdsYaml {
    One(String),
    Many(Vec<ThresholdRuleYaml>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThresholdRuleYaml {
    Expr(String),
    Full(ThresholdRuleFullYaml),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ThresholdRuleFullYaml {
    pub threshold: String,
    #[serde(default)]
    pub abort_on_fail: bool,
    #[serde(default)]
    pub delay_abort_eval: Option<YamlDuration>,
}

/// A named check with exactly one predicate key.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub name: String,
    pub status: Option<u16>,
    pub status_in: Option<Vec<u16>>,
    pub proto: Option<String>,
    pub body_contains: Option<String>,
    pub header: Option<HeaderCheckYaml>,
    pub json_path: Option<JsonPathCheckYaml>,
    #[serde(default)]
    pub max_duration: Option<YamlDuration>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HeaderCheckYaml {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct JsonPathCheckYaml {
    pub pointer: String,
    pub equals: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct HttpYaml {
    pub http2_prior_knowledge: Option<bool>,
    #[serde(default)]
    pub connect_timeout: Option<YamlDuration>,
    #[serde(default)]
    pub pool_idle_timeout: Option<YamlDuration>,
    pub pool_max_idle_per_host: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
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

        impl serde::de::Visitor<'_> for V {
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
                    .map(|secs| YamlDuration(Duration::from_secs(secs)))
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a finite, non-negative number"));
                }
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(E::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn deserialize_scalar_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();

    for (k, v) in raw {
        let s = match v {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "header `{k}` must be a scalar value"
                )));
            }
        };
        out.insert(k, s);
    }

    Ok(out)
}

/// Everything a run needs, validated and with `${VAR}` references resolved.
pub(crate) struct LoadedConfig {
    pub options: RunOptions,
    pub scenario: HttpScenario,
    pub http: HttpClientConfig,
}

pub(crate) async fn load_config(
    path: &Path,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<LoadedConfig> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read config: {}", path.display()))?;

    let doc: ConfigYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string);

    build_config(doc, default_name, env)
        .with_context(|| format!("invalid config: {}", path.display()))
}

pub(crate) fn build_config(
    doc: ConfigYaml,
    default_name: Option<String>,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<LoadedConfig> {
    let ConfigYaml {
        name,
        vus,
        duration,
        start_vus,
        stages,
        thresholds,
        request,
        checks,
        sleep,
        graceful_stop,
        tick,
        http,
    } = doc;

    let options = RunOptions {
        name: name.or(default_name),
        vus,
        duration: duration.map(YamlDuration::into_inner),
        start_vus,
        stages: stages.map(|stages| {
            stages
                .into_iter()
                .map(|s| Stage {
                    duration: s.duration.into_inner(),
                    target: s.target,
                })
                .collect()
        }),
        thresholds: parse_thresholds_map(thresholds)?,
        graceful_stop: graceful_stop.map(YamlDuration::into_inner),
        tick: tick.map(YamlDuration::into_inner),
    };

    let checks = checks
        .into_iter()
        .map(|c| check_from_yaml(c).map(|c| Box::new(c) as Box<dyn Check>))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let scenario = HttpScenario::new(request_from_yaml(request, env)?)
        .with_checks(checks)
        .with_sleep(sleep.map(YamlDuration::into_inner).unwrap_or_default());

    Ok(LoadedConfig {
        options,
        scenario,
        http: http_config_from_yaml(http),
    })
}

fn request_from_yaml(
    req: RequestYaml,
    env: &BTreeMap<String, String>,
) -> anyhow::Result<RequestTemplate> {
    let method = http::Method::from_bytes(req.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid request method `{}`", req.method))?;

    let url = substitute_env(&req.url, env).context("request.url")?;
    let mut template = RequestTemplate::new(method, url)?;

    for (k, v) in req.headers {
        let value = substitute_env(&v, env).with_context(|| format!("request.headers.{k}"))?;
        template.headers.push((k, value));
    }

    if let Some(body) = req.body {
        template.body = substitute_env(&body, env).context("request.body")?.into();
    }

    template.timeout = req.timeout.map(YamlDuration::into_inner);
    template.name = req.name;

    if let Some(statuses) = req.expected_statuses {
        if statuses.is_empty() {
            anyhow::bail!("request.expected_statuses must not be empty");
        }
        template.expected_statuses = statuses
            .into_iter()
            .map(|s| match s {
                StatusYaml::One(code) => StatusRange::single(code),
                StatusYaml::Range([start, end]) => StatusRange::new(start, end),
            })
            .collect::<barrage_core::runner::Result<Vec<_>>>()?;
    }

    Ok(template)
}

fn check_from_yaml(check: CheckYaml) -> anyhow::Result<NamedCheck> {
    let CheckYaml {
        name,
        status,
        status_in,
        proto,
        body_contains,
        header,
        json_path,
        max_duration,
    } = check;

    let mut predicates = Vec::new();
    predicates.extend(status.map(Predicate::Status));
    predicates.extend(status_in.map(Predicate::StatusIn));
    predicates.extend(proto.map(Predicate::Proto));
    predicates.extend(body_contains.map(Predicate::BodyContains));
    predicates.extend(header.map(|h| Predicate::Header {
        name: h.name,
        value: h.value,
    }));
    predicates.extend(json_path.map(|j| Predicate::JsonPath {
        pointer: j.pointer,
        equals: j.equals,
    }));
    predicates.extend(max_duration.map(|d| Predicate::MaxDuration(d.into_inner())));

    let predicate = match predicates.len() {
        1 => predicates.remove(0),
        0 => anyhow::bail!("check `{name}` has no predicate"),
        n => anyhow::bail!("check `{name}` has {n} predicates; use one check per predicate"),
    };

    Ok(NamedCheck::new(name, predicate)?)
}

fn parse_thresholds_map(
    raw: BTreeMap<String, ThresholdsYaml>,
) -> anyhow::Result<Vec<ThresholdSet>> {
    let mut out = Vec::new();

    for (metric_key, v) in raw {
        let rules: Vec<ThresholdRule> = match v {
            ThresholdsYaml::One(s) => vec![ThresholdRule::new(s)],
            ThresholdsYaml::Many(v) => v
                .into_iter()
                .map(|r| match r {
                    ThresholdRuleYaml::Expr(s) => ThresholdRule::new(s),
                    ThresholdRuleYaml::Full(f) => ThresholdRule {
                        expression: f.threshold,
                        abort_on_fail: f.abort_on_fail,
                        delay_abort_eval: f.delay_abort_eval.map(YamlDuration::into_inner),
                    },
                })
                .collect(),
        };

        if rules.is_empty() {
            anyhow::bail!("invalid thresholds for `{metric_key}`: empty list");
        }

        out.push(ThresholdSet {
            metric: metric_key,
            rules,
        });
    }

    Ok(out)
}

fn http_config_from_yaml(http: HttpYaml) -> HttpClientConfig {
    let mut cfg = HttpClientConfig::default();
    if let Some(v) = http.http2_prior_knowledge {
        cfg.http2_prior_knowledge = v;
    }
    if let Some(v) = http.connect_timeout {
        cfg.connect_timeout = Some(v.into_inner());
    }
    if let Some(v) = http.pool_idle_timeout {
        cfg.pool_idle_timeout = Some(v.into_inner());
    }
    if let Some(v) = http.pool_max_idle_per_host {
        cfg.pool_max_idle_per_host = v;
    }
    cfg
}

/// Expands `${VAR}` and `${VAR:-default}` from `env`.
pub(crate) fn substitute_env(raw: &str, env: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| anyhow::anyhow!("unterminated `${{` in `{raw}`"))?;
        let inner = &after[..end];

        let (key, default) = match inner.split_once(":-") {
            Some((k, d)) => (k.trim(), Some(d)),
            None => (inner.trim(), None),
        };
        if key.is_empty() {
            anyhow::bail!("empty variable reference in `{raw}`");
        }

        match (env.get(key), default) {
            (Some(v), _) => out.push_str(v),
            (None, Some(d)) => out.push_str(d),
            (None, None) => anyhow::bail!("environment variable `{key}` is not set"),
        }

        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrage_core::runner::{LoadShape, RunPlan};
    use std::path::PathBuf;

    fn fixture_path(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("config_yaml")
            .join(name)
    }

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(yaml: &str) -> ConfigYaml {
        serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("{e:#}"))
    }

    #[test]
    fn substitutes_vars_and_defaults() {
        let env = env(&[("BASE_URL", "http://127.0.0.1:9")]);
        let out = substitute_env("${BASE_URL}/a?x=${X:-1}&y=${ Y :-}", &env)
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(out, "http://127.0.0.1:9/a?x=1&y=");

        assert_eq!(
            substitute_env("no refs $HOME", &env).unwrap_or_else(|e| panic!("{e:#}")),
            "no refs $HOME"
        );
    }

    #[test]
    fn undefined_var_without_default_is_an_error() {
        let err = match substitute_env("${MISSING}/x", &BTreeMap::new()) {
            Ok(v) => panic!("expected error, got {v}"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("MISSING"), "{err}");
        assert!(substitute_env("${OPEN", &BTreeMap::new()).is_err());
    }

    #[test]
    fn durations_accept_strings_and_seconds() {
        let doc = parse(
            r#"
duration: 1m30s
tick: 0.5
graceful_stop: 2
request: { url: "http://localhost/" }
"#,
        );
        assert_eq!(doc.duration, Some(YamlDuration(Duration::from_secs(90))));
        assert_eq!(doc.tick, Some(YamlDuration(Duration::from_millis(500))));
        assert_eq!(doc.graceful_stop, Some(YamlDuration(Duration::from_secs(2))));

        let bad: Result<ConfigYaml, _> =
            serde_yaml::from_str("duration: -1\nrequest: { url: \"http://localhost/\" }\n");
        assert!(bad.is_err());
    }

    #[test]
    fn oversized_float_duration_is_an_error() {
        let res: Result<ConfigYaml, _> =
            serde_yaml::from_str("duration: 1e20\nrequest: { url: \"http://localhost/\" }\n");
        assert!(res.is_err());
    }

    #[test]
    fn thresholds_accept_string_list_and_objects() {
        let doc = parse(
            r#"
request: { url: "http://localhost/" }
thresholds:
  http_req_failed: "rate<0.01"
  http_req_duration{status:200}: ["p(95)<500", "avg<200"]
  checks:
    - threshold: "rate>0.99"
      abort_on_fail: true
      delay_abort_eval: 5s
"#,
        );

        let sets = parse_thresholds_map(doc.thresholds).unwrap_or_else(|e| panic!("{e:#}"));
        assert_eq!(sets.len(), 3);

        let checks = &sets[0];
        assert_eq!(checks.metric, "checks");
        assert!(checks.rules[0].abort_on_fail);
        assert_eq!(checks.rules[0].delay_abort_eval, Some(Duration::from_secs(5)));

        let duration = &sets[1];
        assert_eq!(duration.metric, "http_req_duration{status:200}");
        assert_eq!(duration.rules.len(), 2);
        assert!(!duration.rules[1].abort_on_fail);

        assert_eq!(sets[2].rules[0].expression, "rate<0.01");
    }

    #[test]
    fn empty_threshold_list_is_rejected() {
        let doc = parse("request: { url: \"http://localhost/\" }\nthresholds: { checks: [] }\n");
        assert!(parse_thresholds_map(doc.thresholds).is_err());
    }

    #[test]
    fn check_needs_exactly_one_predicate() {
        let doc = parse(
            r#"
request: { url: "http://localhost/" }
checks:
  - { name: "ok", status: 200 }
  - { name: "none" }
  - { name: "two", status: 200, proto: "HTTP/2.0" }
  - name: "json"
    json_path: { pointer: "/count", equals: 3 }
"#,
        );
        let mut checks = doc.checks.into_iter();

        let ok = checks
            .next()
            .map(check_from_yaml)
            .unwrap_or_else(|| panic!("missing check"))
            .unwrap_or_else(|e| panic!("{e:#}"));
        assert!(matches!(ok.predicate(), Predicate::Status(200)));

        for _ in 0..2 {
            let res = checks
                .next()
                .map(check_from_yaml)
                .unwrap_or_else(|| panic!("missing check"));
            assert!(res.is_err());
        }

        let json = checks
            .next()
            .map(check_from_yaml)
            .unwrap_or_else(|| panic!("missing check"))
            .unwrap_or_else(|e| panic!("{e:#}"));
        match json.predicate() {
            Predicate::JsonPath { pointer, equals } => {
                assert_eq!(pointer, "/count");
                assert_eq!(equals.as_ref(), Some(&serde_json::json!(3)));
            }
            other => panic!("unexpected predicate {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad: Result<ConfigYaml, _> =
            serde_yaml::from_str("vu: 3\nrequest: { url: \"http://localhost/\" }\n");
        assert!(bad.is_err());
    }

    #[test]
    fn request_statuses_and_headers_resolve() {
        let doc = parse(
            r#"
request:
  method: post
  url: "${BASE_URL}/echo"
  headers: { accept: application/json, x-retry: 3, x-token: "${TOKEN:-anon}" }
  body: '{"ping": true}'
  timeout: 250ms
  name: echo
  expected_statuses: [[200, 299], 304]
"#,
        );
        let env = env(&[("BASE_URL", "http://127.0.0.1:1")]);
        let cfg = build_config(doc, Some("stem".to_string()), &env)
            .unwrap_or_else(|e| panic!("{e:#}"));

        let req = cfg.scenario.request();
        assert_eq!(req.method, http::Method::POST);
        assert_eq!(req.url, "http://127.0.0.1:1/echo");
        assert_eq!(
            req.headers,
            vec![
                ("accept".to_string(), "application/json".to_string()),
                ("x-retry".to_string(), "3".to_string()),
                ("x-token".to_string(), "anon".to_string()),
            ]
        );
        assert_eq!(&req.body[..], br#"{"ping": true}"#);
        assert_eq!(req.timeout, Some(Duration::from_millis(250)));
        assert_eq!(req.name.as_deref(), Some("echo"));
        assert_eq!(req.expected_statuses.len(), 2);
        assert!(StatusRange::matches_any(&req.expected_statuses, 304));
        assert!(!StatusRange::matches_any(&req.expected_statuses, 301));

        assert_eq!(cfg.options.name.as_deref(), Some("stem"));
    }

    #[test]
    fn invalid_status_range_is_rejected() {
        let doc = parse(
            "request: { url: \"http://localhost/\", expected_statuses: [[399, 200]] }\n",
        );
        assert!(build_config(doc, None, &BTreeMap::new()).is_err());
    }

    #[tokio::test]
    async fn loads_ramping_fixture() {
        let path = fixture_path("ramping.yaml");
        let env = env(&[("BASE_URL", "http://127.0.0.1:8080")]);
        let cfg = load_config(&path, &env)
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(cfg.options.name.as_deref(), Some("devices"));
        assert!(cfg.http.http2_prior_knowledge);
        assert_eq!(cfg.http.pool_max_idle_per_host, 64);
        assert_eq!(cfg.scenario.checks().len(), 3);

        let plan = RunPlan::from_options(cfg.options).unwrap_or_else(|e| panic!("{e:#}"));
        match &plan.shape {
            LoadShape::RampingVus { start_vus, stages } => {
                assert_eq!(*start_vus, 0);
                assert_eq!(stages.len(), 4);
                assert_eq!(stages[1].target, 10);
            }
            other => panic!("unexpected shape {other:?}"),
        }
        assert_eq!(plan.total_duration(), Duration::from_secs(45));
        assert_eq!(plan.thresholds.len(), 3);
    }

    #[tokio::test]
    async fn constant_fixture_defaults_name_to_file_stem() {
        let path = fixture_path("constant.yaml");
        let env = env(&[("BASE_URL", "http://127.0.0.1:8080")]);
        let cfg = load_config(&path, &env)
            .await
            .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(cfg.options.name.as_deref(), Some("constant"));
        assert_eq!(cfg.options.vus, Some(2));
        assert!(!cfg.http.http2_prior_knowledge);
    }

    #[tokio::test]
    async fn missing_base_url_fails_to_load() {
        let path = fixture_path("constant.yaml");
        assert!(load_config(&path, &BTreeMap::new()).await.is_err());
    }
}
