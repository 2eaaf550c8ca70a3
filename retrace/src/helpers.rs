use crate::errors::AutomationError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

static VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_.-]+)\s*\}\}").expect("valid variable regex"));

/// Replaces `{{name}}` placeholders from `variables`. Unknown names are left untouched.
pub fn substitute_variables(template: &str, variables: &HashMap<String, String>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    VARIABLE_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Strips optional `{{ }}` around a variable name.
pub fn variable_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Sleeps for `duration` unless the token fires first.
pub async fn sleep_cancellable(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), AutomationError> {
    if cancel.is_cancelled() {
        return Err(AutomationError::Cancelled);
    }
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AutomationError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_substitute_variables() {
        let vars: HashMap<String, String> = [
            ("name".to_string(), "Ada".to_string()),
            ("order.id".to_string(), "42".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            substitute_variables("Hi {{name}}, order {{ order.id }}", &vars),
            "Hi Ada, order 42"
        );
        assert_eq!(substitute_variables("{{missing}}", &vars), "{{missing}}");
        assert_eq!(substitute_variables("plain", &vars), "plain");
    }

    #[test]
    fn test_variable_name() {
        assert_eq!(variable_name("{{ total }}"), "total");
        assert_eq!(variable_name("total"), "total");
    }

    #[tokio::test]
    async fn test_sleep_cancellable_returns_early() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            child.cancel();
        });
        let started = Instant::now();
        let result = sleep_cancellable(Duration::from_secs(10), &token).await;
        assert!(matches!(result, Err(AutomationError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
