//! Deterministic action-intent classifier (`spec.md` §4.5
//! `classifyComplexity`): scans a task description for tokens in a handful
//! of well-known action categories and reports whether any matched.

const CATEGORIES: &[(&str, &[&str])] = &[
    ("browser", &["browse", "navigate", "website", "webpage", "url", "click", "scroll"]),
    ("media", &["play", "pause", "video", "music", "audio", "stream"]),
    ("file", &["save", "delete", "create file", "write file", "read file", "move file", "rename"]),
    ("shell", &["run command", "shell", "terminal", "execute", "bash", "script"]),
    ("network", &["api", "request", "fetch", "download", "upload", "http"]),
    ("iot", &["device", "sensor", "smart home", "thermostat", "light switch"]),
    ("desktop", &["open app", "application", "window", "desktop", "folder path"]),
    ("path", &["/", "\\", "file path", "directory"]),
];

/// `action_intent` score (`spec.md` §4.5): ≥ 0.7 if any category matches.
pub fn classify_action_intent(description: &str) -> f64 {
    let lower = description.to_lowercase();
    let matched = CATEGORIES
        .iter()
        .any(|(_, tokens)| tokens.iter().any(|token| lower.contains(token)));
    if matched {
        0.7
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_command_description_matches() {
        assert!(classify_action_intent("run command to list files") >= 0.7);
    }

    #[test]
    fn pure_knowledge_question_does_not_match() {
        assert_eq!(classify_action_intent("what is the capital of France?"), 0.0);
    }

    #[test]
    fn browser_navigation_description_matches() {
        assert!(classify_action_intent("navigate to the signup page and click submit") >= 0.7);
    }
}
