//! `get_time`: current date and time.

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::{json, Value};

use crate::agent_core::Tool;

pub struct GetTimeTool;

fn describe<Tz: TimeZone>(now: DateTime<Tz>) -> Value
where
    Tz::Offset: std::fmt::Display,
{
    json!({
        "date": now.format("%Y-%m-%d").to_string(),
        "time": now.format("%H:%M").to_string(),
        "weekday": now.format("%A").to_string(),
        "iso": now.to_rfc3339(),
    })
}

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time (local time unless utc is true)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "utc": {"type": "boolean", "description": "Return UTC instead of local time"}
            }
        })
    }

    fn groups(&self) -> Vec<String> {
        vec!["time".into()]
    }

    async fn execute(&self, args: Value) -> anyhow::Result<Value> {
        let utc = args.get("utc").and_then(Value::as_bool).unwrap_or(false);
        Ok(if utc {
            describe(Utc::now())
        } else {
            describe(Local::now())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_describe_fields() {
        let at = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 10, 18)
                .unwrap()
                .and_hms_opt(14, 5, 0)
                .unwrap(),
        );
        let v = describe(at);
        assert_eq!(v["date"], "2026-10-18");
        assert_eq!(v["time"], "14:05");
        assert_eq!(v["weekday"], "Sunday");
        assert_eq!(v["iso"], "2026-10-18T14:05:00+00:00");
    }

    #[tokio::test]
    async fn test_execute_utc() {
        let v = GetTimeTool.execute(json!({"utc": true})).await.unwrap();
        assert!(v["iso"].as_str().unwrap().ends_with("+00:00"));
        assert_eq!(v["time"].as_str().unwrap().len(), 5);
    }
}
