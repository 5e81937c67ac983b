//! The subset of GitHub's push event the dispatcher and job need.

use serde::{Deserialize, Serialize};

use crate::model::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// SHA the ref points at after the push.
    #[serde(default)]
    pub after: String,
    pub repository: Repository,
    pub pusher: Pusher,
    /// `None` when the push deleted the ref.
    #[serde(default)]
    pub head_commit: Option<Commit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub clone_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pusher {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub message: String,
}

impl PushEvent {
    /// Full SHA of the pushed head.
    pub fn commit_id(&self) -> &str {
        self.head_commit
            .as_ref()
            .map(|c| c.id.as_str())
            .unwrap_or(&self.after)
    }

    /// First six characters of the head SHA.
    pub fn short_commit(&self) -> &str {
        let id = self.commit_id();
        id.get(..6).unwrap_or(id)
    }

    /// Whether this push was made by the job publishing its own results.
    pub fn is_self_published(&self, marker: &str) -> bool {
        self.head_commit
            .as_ref()
            .is_some_and(|c| c.message.trim() == marker.trim())
    }

    /// Project into a dispatcher task keyed by the pusher.
    pub fn into_task(self, manual: bool) -> Task<PushEvent> {
        let key = self.pusher.name.clone();
        Task::new(key, self).manual(manual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "ref": "refs/heads/main",
            "after": "0123456789abcdef",
            "repository": {
                "full_name": "ece220/alice",
                "clone_url": "https://github.com/ece220/alice.git",
                "private": true
            },
            "pusher": { "name": "alice", "email": "alice@example.com" },
            "head_commit": { "id": "abcdef0123456789", "message": "finish mp2" },
            "commits": []
        })
    }

    #[test]
    fn decodes_github_push_and_ignores_extra_fields() {
        let push: PushEvent = serde_json::from_value(sample()).unwrap();
        assert_eq!(push.git_ref, "refs/heads/main");
        assert_eq!(push.pusher.name, "alice");
        assert_eq!(push.short_commit(), "abcdef");
    }

    #[test]
    fn branch_deletion_has_no_head_commit() {
        let mut value = sample();
        value["head_commit"] = serde_json::Value::Null;
        let push: PushEvent = serde_json::from_value(value).unwrap();
        assert!(push.head_commit.is_none());
        assert_eq!(push.commit_id(), "0123456789abcdef");
    }

    #[test]
    fn self_published_marker_matches_head_message() {
        let mut value = sample();
        value["head_commit"]["message"] = json!("Report Generated.\n");
        let push: PushEvent = serde_json::from_value(value).unwrap();
        assert!(push.is_self_published("Report Generated."));
        assert!(!push.is_self_published("Something else"));
    }

    #[test]
    fn task_is_keyed_by_pusher() {
        let push: PushEvent = serde_json::from_value(sample()).unwrap();
        let task = push.into_task(true);
        assert_eq!(task.key, "alice");
        assert!(task.manual);
    }
}
