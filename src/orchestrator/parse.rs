//! 解析 AI 回复：动作计划或自由文本
//!
//! 回复中找不到计划形状的 JSON（无 JSON、JSON 无 actions/steps 数组）时整体作为自由文本说明；
//! 找到了计划形状但其中某步 kind 未知或参数不合法，则是计划校验错误。

use serde_json::{Map, Value};

use crate::actions::{Action, ActionPlan, ActionStep};
use crate::core::PlanValidationError;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanParse {
    Plan {
        explanation: Option<String>,
        plan: ActionPlan,
    },
    FreeText(String),
}

/// 解析 AI 回复文本
pub fn parse_plan(text: &str) -> Result<PlanParse, PlanValidationError> {
    let trimmed = text.trim();
    for candidate in json_candidates(trimmed) {
        let Ok(value) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        match value {
            Value::Object(map) => {
                if let Some(steps) = steps_array(&map) {
                    let plan = build_plan(steps, plan_level_critical(&map))?;
                    return Ok(PlanParse::Plan {
                        explanation: explanation_of(&map),
                        plan,
                    });
                }
                // 只有说明文字的 JSON 也按自由文本处理
                if let Some(explanation) = explanation_of(&map) {
                    return Ok(PlanParse::FreeText(explanation));
                }
            }
            Value::Array(items) if looks_like_steps(&items) => {
                return Ok(PlanParse::Plan {
                    explanation: None,
                    plan: build_plan(&items, false)?,
                });
            }
            _ => {}
        }
    }
    Ok(PlanParse::FreeText(trimmed.to_string()))
}

/// 候选 JSON 片段：```json 围栏、首个 `{` 到最后一个 `}`、首个 `[` 到最后一个 `]`
fn json_candidates(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if let Some(start) = text.find("```") {
        let rest = &text[start + 3..];
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        out.push(body.trim());
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            out.push(&text[start..=end]);
        }
    }
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if start < end {
            out.push(&text[start..=end]);
        }
    }
    out
}

fn steps_array(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    map.get("actions")
        .or_else(|| map.get("steps"))
        .and_then(Value::as_array)
}

fn plan_level_critical(map: &Map<String, Value>) -> bool {
    map.get("critical").and_then(Value::as_bool).unwrap_or(false)
}

fn explanation_of(map: &Map<String, Value>) -> Option<String> {
    ["explanation", "response", "message"]
        .iter()
        .filter_map(|k| map.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn looks_like_steps(items: &[Value]) -> bool {
    !items.is_empty()
        && items
            .iter()
            .all(|v| v.get("kind").is_some() || v.get("type").is_some())
}

fn build_plan(items: &[Value], critical: bool) -> Result<ActionPlan, PlanValidationError> {
    let steps = items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_step(index, item))
        .collect::<Result<Vec<_>, _>>()?;
    let mut plan = ActionPlan::new(steps);
    plan.critical = critical;
    Ok(plan)
}

/// `{kind|type, parameters|params, critical?}`；两种参数键都缺失时，其余字段即参数
fn parse_step(index: usize, item: &Value) -> Result<ActionStep, PlanValidationError> {
    let Some(map) = item.as_object() else {
        return Err(PlanValidationError::InvalidParameters {
            index,
            kind: String::new(),
            message: "step must be a JSON object".to_string(),
        });
    };
    let kind = map
        .get("kind")
        .or_else(|| map.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let parameters = match map.get("parameters").or_else(|| map.get("params")) {
        Some(p) => p.clone(),
        None => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "kind" | "type" | "critical"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
    };
    let action = Action::from_parts(index, kind, parameters)?;
    Ok(ActionStep {
        action,
        critical: map.get("critical").and_then(Value::as_bool),
    })
}
