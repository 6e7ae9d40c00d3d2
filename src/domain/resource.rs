use std::fmt;

/// Fully qualified topic name, `projects/{project}/topics/{topic}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPath(String);

impl TopicPath {
    pub fn new(project_id: &str, topic_id: &str) -> Self {
        Self(format!("projects/{project_id}/topics/{topic_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully qualified subscription name,
/// `projects/{project}/subscriptions/{subscription}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionPath(String);

impl SubscriptionPath {
    pub fn new(project_id: &str, subscription_id: &str) -> Self {
        Self(format!("projects/{project_id}/subscriptions/{subscription_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
