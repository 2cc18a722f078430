//! Declarative speaking-order schedules, parsed from YAML.
//!
//! ```yaml
//! version: 1
//! repeat: true          # true = whole plan repeats each round
//! plan:
//!   - expert: "Critical Reviewer"
//!   - parallel:
//!       - expert: "Creative Strategist"
//!       - expert: "Data Analyst"
//!   - manual:
//!       author: "moderator"
//!       content: "please focus on feasibility"
//!       reply_to: null
//!   - all_experts: true
//! ```
//!
//! `repeat: true` runs the plan once per round up to `max_rounds`;
//! `repeat: false` runs each step once, one step per round.

use serde_yaml::Value;

/// One step of the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A single named expert speaks.
    Expert(String),
    /// Several named experts speak concurrently.
    Parallel(Vec<String>),
    /// Every selected expert speaks concurrently.
    AllExperts,
    /// A post injected verbatim, no LLM involved.
    Manual {
        author: String,
        content: String,
        reply_to: Option<u64>,
    },
}

/// Parsed schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub steps: Vec<Step>,
    pub repeat: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleParseError {
    #[error("schedule YAML is invalid: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Shape(String),
}

fn shape(msg: impl Into<String>) -> ScheduleParseError {
    ScheduleParseError::Shape(msg.into())
}

/// Parses a YAML schedule string.
pub fn parse_schedule(yaml: &str) -> Result<Schedule, ScheduleParseError> {
    let data: Value = serde_yaml::from_str(yaml)?;
    let map = data
        .as_mapping()
        .ok_or_else(|| shape("schedule YAML must be a mapping with a 'plan' key"))?;

    let plan = map
        .get(Value::from("plan"))
        .ok_or_else(|| shape("schedule YAML must contain a 'plan' key"))?
        .as_sequence()
        .ok_or_else(|| shape("'plan' must be a list of steps"))?;

    let repeat = map
        .get(Value::from("repeat"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut steps = Vec::with_capacity(plan.len());
    for (i, item) in plan.iter().enumerate() {
        let step = item
            .as_mapping()
            .ok_or_else(|| shape(format!("step {i}: must be a mapping")))?;

        if let Some(expert) = step.get(Value::from("expert")) {
            let name = expert
                .as_str()
                .ok_or_else(|| shape(format!("step {i}: 'expert' must be a name")))?;
            steps.push(Step::Expert(name.to_string()));
        } else if let Some(parallel) = step.get(Value::from("parallel")) {
            let entries = parallel
                .as_sequence()
                .ok_or_else(|| shape(format!("step {i}: 'parallel' must be a list")))?;
            let mut names = Vec::new();
            for entry in entries {
                match entry {
                    Value::String(name) => names.push(name.clone()),
                    Value::Mapping(m) => {
                        let name = m
                            .get(Value::from("expert"))
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                shape(format!("step {i}: parallel entries must have an 'expert' key"))
                            })?;
                        names.push(name.to_string());
                    }
                    _ => {
                        return Err(shape(format!(
                            "step {i}: parallel entries must be names or {{expert: name}}"
                        )))
                    }
                }
            }
            if names.is_empty() {
                return Err(shape(format!("step {i}: parallel list is empty")));
            }
            steps.push(Step::Parallel(names));
        } else if step.contains_key(Value::from("all_experts")) {
            steps.push(Step::AllExperts);
        } else if let Some(manual) = step.get(Value::from("manual")) {
            let m = manual
                .as_mapping()
                .ok_or_else(|| shape(format!("step {i}: 'manual' must be a mapping")))?;
            let content = m
                .get(Value::from("content"))
                .and_then(Value::as_str)
                .ok_or_else(|| shape(format!("step {i}: manual must have 'content'")))?;
            let author = m
                .get(Value::from("author"))
                .and_then(Value::as_str)
                .unwrap_or("moderator");
            let reply_to = m.get(Value::from("reply_to")).and_then(Value::as_u64);
            steps.push(Step::Manual {
                author: author.to_string(),
                content: content.to_string(),
                reply_to,
            });
        } else {
            let keys: Vec<String> = step
                .keys()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            return Err(shape(format!("step {i}: unknown step type, keys={keys:?}")));
        }
    }

    Ok(Schedule { steps, repeat })
}

/// Loads and parses a schedule from a YAML file.
pub fn load_schedule_file(path: &str) -> Result<Schedule, ScheduleParseError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| shape(format!("cannot read schedule file {path}: {e}")))?;
    parse_schedule(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_step_kinds() {
        let schedule = parse_schedule(
            r#"
version: 1
repeat: true
plan:
  - expert: "Critical Reviewer"
  - parallel:
      - expert: "Creative Strategist"
      - "Data Analyst"
  - manual:
      author: "host"
      content: "focus on feasibility"
      reply_to: 2
  - all_experts: true
"#,
        )
        .unwrap();
        assert!(schedule.repeat);
        assert_eq!(schedule.steps.len(), 4);
        assert_eq!(schedule.steps[0], Step::Expert("Critical Reviewer".into()));
        assert_eq!(
            schedule.steps[1],
            Step::Parallel(vec!["Creative Strategist".into(), "Data Analyst".into()])
        );
        assert_eq!(
            schedule.steps[2],
            Step::Manual {
                author: "host".into(),
                content: "focus on feasibility".into(),
                reply_to: Some(2),
            }
        );
        assert_eq!(schedule.steps[3], Step::AllExperts);
    }

    #[test]
    fn manual_defaults_author_to_moderator() {
        let schedule = parse_schedule("plan:\n  - manual:\n      content: hello\n").unwrap();
        assert_eq!(
            schedule.steps[0],
            Step::Manual {
                author: "moderator".into(),
                content: "hello".into(),
                reply_to: None,
            }
        );
        assert!(!schedule.repeat);
    }

    /// **Scenario**: malformed plans produce specific shape errors.
    #[test]
    fn rejects_malformed_plans() {
        assert!(parse_schedule("repeat: true").is_err());
        assert!(parse_schedule("plan: 7").is_err());
        assert!(parse_schedule("plan:\n  - parallel: []\n").is_err());
        assert!(parse_schedule("plan:\n  - manual:\n      author: x\n").is_err());
        let err = parse_schedule("plan:\n  - dance: true\n").unwrap_err();
        assert!(err.to_string().contains("unknown step type"));
    }
}
