//! 查询/计划形状的归一化，用于 LearnedPattern 的去重与计数

use std::sync::OnceLock;

use regex::Regex;

use crate::actions::ActionPlan;

/// 查询 + 产生了动作计划
pub const QUERY_PLAN_PATTERN: &str = "query_plan";
/// 查询只得到文本回复
pub const QUERY_PATTERN: &str = "query";

static QUOTED_RE: OnceLock<Regex> = OnceLock::new();
static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
static SPACES_RE: OnceLock<Regex> = OnceLock::new();

/// 归一化后的形状：相同意图的查询落在同一条 LearnedPattern 上
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternShape {
    pub pattern_type: &'static str,
    pub pattern_data: String,
}

impl PatternShape {
    pub fn from_exchange(query: &str, plan: &ActionPlan) -> Self {
        let query = normalize_query(query);
        if plan.is_empty() {
            return Self {
                pattern_type: QUERY_PATTERN,
                pattern_data: query,
            };
        }
        let kinds = plan
            .kinds()
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Self {
            pattern_type: QUERY_PLAN_PATTERN,
            pattern_data: format!("{}|{}", query, kinds),
        }
    }
}

/// 小写、引号内容替换为 `"…"`、数字替换为 `#`、合并空白
pub fn normalize_query(query: &str) -> String {
    let lower = query.trim().to_lowercase();
    let quoted = QUOTED_RE.get_or_init(|| Regex::new(r#""[^"]*"|'[^']*'"#).unwrap());
    let digits = DIGITS_RE.get_or_init(|| Regex::new(r"\d+").unwrap());
    let spaces = SPACES_RE.get_or_init(|| Regex::new(r"\s+").unwrap());

    let unquoted = quoted.replace_all(&lower, "\"…\"");
    let numbered = digits.replace_all(&unquoted, "#");
    spaces.replace_all(&numbered, " ").into_owned()
}
