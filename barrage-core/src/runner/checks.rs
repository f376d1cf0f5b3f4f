//! Named predicates evaluated against each response.
//!
//! A check never aborts the iteration: errors and panics inside a predicate
//! are turned into failed results carrying the fault message.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use barrage_http::HttpResponse;

use super::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PredicateFault(pub String);

impl PredicateFault {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, res: &HttpResponse) -> std::result::Result<bool, PredicateFault>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Status(u16),
    StatusIn(Vec<u16>),
    Proto(String),
    BodyContains(String),
    /// Header is present, and equals `value` when given.
    Header {
        name: String,
        value: Option<String>,
    },
    /// RFC 6901 pointer into a JSON body.
    JsonPath {
        pointer: String,
        equals: Option<serde_json::Value>,
    },
    MaxDuration(Duration),
}

impl Predicate {
    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Predicate::StatusIn(list) if list.is_empty() => {
                Err("`status_in` needs at least one status".to_string())
            }
            Predicate::Header { name, .. } if name.trim().is_empty() => {
                Err("`header` needs a header name".to_string())
            }
            Predicate::JsonPath { pointer, .. }
                if !pointer.is_empty() && !pointer.starts_with('/') =>
            {
                Err(format!("json pointer `{pointer}` must start with `/`"))
            }
            _ => Ok(()),
        }
    }

    pub fn test(&self, res: &HttpResponse) -> std::result::Result<bool, PredicateFault> {
        Ok(match self {
            Predicate::Status(code) => res.status == *code,
            Predicate::StatusIn(codes) => codes.contains(&res.status),
            Predicate::Proto(proto) => res.proto == proto.as_str(),
            Predicate::BodyContains(needle) => {
                let body = res
                    .body_utf8()
                    .ok_or_else(|| PredicateFault::new("body is not valid UTF-8"))?;
                body.contains(needle.as_str())
            }
            Predicate::Header { name, value } => match (res.header(name), value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(got), Some(want)) => got == want.as_str(),
            },
            Predicate::JsonPath { pointer, equals } => {
                let doc: serde_json::Value = serde_json::from_slice(&res.body)
                    .map_err(|e| PredicateFault::new(format!("body is not JSON: {e}")))?;
                match (doc.pointer(pointer), equals) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(got), Some(want)) => got == want,
                }
            }
            Predicate::MaxDuration(limit) => res.timings.duration <= *limit,
        })
    }
}

/// A built-in predicate under a user-facing name.
#[derive(Debug, Clone)]
pub struct NamedCheck {
    name: String,
    predicate: Predicate,
}

impl NamedCheck {
    pub fn new(name: impl Into<String>, predicate: Predicate) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidCheck {
                name,
                reason: "name must not be empty".to_string(),
            });
        }
        predicate
            .validate()
            .map_err(|reason| Error::InvalidCheck {
                name: name.clone(),
                reason,
            })?;
        Ok(Self { name, predicate })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }
}

impl Check for NamedCheck {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, res: &HttpResponse) -> std::result::Result<bool, PredicateFault> {
        self.predicate.test(res)
    }
}

/// Closure adapter for ad-hoc checks.
pub struct FnCheck<F> {
    name: String,
    f: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&HttpResponse) -> std::result::Result<bool, PredicateFault> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Check for FnCheck<F>
where
    F: Fn(&HttpResponse) -> std::result::Result<bool, PredicateFault> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, res: &HttpResponse) -> std::result::Result<bool, PredicateFault> {
        (self.f)(res)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub fault: Option<String>,
}

impl CheckResult {
    /// Marks every check failed, e.g. when the request produced no response.
    pub fn fail_all(checks: &[Box<dyn Check>], fault: &str) -> Vec<CheckResult> {
        checks
            .iter()
            .map(|c| CheckResult {
                name: c.name().to_string(),
                passed: false,
                fault: Some(fault.to_string()),
            })
            .collect()
    }
}

pub fn evaluate_checks(checks: &[Box<dyn Check>], res: &HttpResponse) -> Vec<CheckResult> {
    checks
        .iter()
        .map(|check| {
            let outcome = catch_unwind(AssertUnwindSafe(|| check.evaluate(res)));
            let (passed, fault) = match outcome {
                Ok(Ok(passed)) => (passed, None),
                Ok(Err(fault)) => (false, Some(fault.0)),
                Err(payload) => (false, Some(panic_message(payload.as_ref()))),
            };
            if let Some(fault) = &fault {
                tracing::debug!(check = check.name(), fault = %fault, "check faulted");
            }
            CheckResult {
                name: check.name().to_string(),
                passed,
                fault,
            }
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
