//! Log records and aggregation queries

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use promptwall_core::{Decision, DecisionStatus, ReasonCode};
use serde::{Deserialize, Serialize};

/// One persisted decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Option<String>,
    pub status: DecisionStatus,
    /// Prompt as received
    pub payload: String,
    /// Prompt as forwarded; absent when blocked
    pub sanitized_payload: Option<String>,
    pub reason_code: ReasonCode,
    /// Name of the group the decision was evaluated under
    #[serde(default)]
    pub group: Option<String>,
}

impl LogRecord {
    pub fn from_decision(decision: &Decision, agent_id: Option<&str>) -> Self {
        Self {
            id: format!("log_{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now(),
            agent_id: agent_id.map(str::to_string),
            status: decision.status,
            payload: decision.original_prompt.clone(),
            sanitized_payload: decision.forwardable_prompt().map(str::to_string),
            reason_code: decision.reason_code.clone(),
            group: decision.group_ref.as_ref().map(|g| g.name.clone()),
        }
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Breakdown dimension for aggregate queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    AgentId,
    Status,
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "agent_id" | "agent" => Ok(Self::AgentId),
            "status" => Ok(Self::Status),
            other => Err(format!("unknown group_by '{}', expected agent_id or status", other)),
        }
    }
}

/// Relative time window ending now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    LastHour,
    LastDay,
    LastWeek,
    All,
}

impl TimeRange {
    /// Lower bound of the window relative to `now`
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::LastHour => Some(now - Duration::hours(1)),
            Self::LastDay => Some(now - Duration::hours(24)),
            Self::LastWeek => Some(now - Duration::days(7)),
            Self::All => None,
        }
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1h" => Ok(Self::LastHour),
            "24h" | "1d" => Ok(Self::LastDay),
            "7d" => Ok(Self::LastWeek),
            "all" => Ok(Self::All),
            other => Err(format!("unknown time range '{}', expected 1h, 24h, 7d or all", other)),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LastHour => "1h",
            Self::LastDay => "24h",
            Self::LastWeek => "7d",
            Self::All => "all",
        })
    }
}

/// Filter for aggregate counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub group_by: Option<GroupBy>,
}

impl MetricsQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window ending at `now`
    pub fn range(mut self, range: TimeRange, now: DateTime<Utc>) -> Self {
        self.from = range.since(now);
        self.to = Some(now);
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| timestamp >= from) && self.to.map_or(true, |to| timestamp <= to)
    }
}

/// Filter for recent log records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub status: Option<DecisionStatus>,
    pub agent_id: Option<String>,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            status: None,
            agent_id: None,
            limit: 10,
        }
    }
}

impl LogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: DecisionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, record: &LogRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self
                .agent_id
                .as_ref()
                .map_or(true, |a| record.agent_id.as_ref() == Some(a))
    }
}

/// Per-status counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTally {
    pub allowed: u64,
    pub redacted: u64,
    pub blocked: u64,
}

impl StatusTally {
    pub fn add(&mut self, status: DecisionStatus) {
        match status {
            DecisionStatus::Allowed => self.allowed += 1,
            DecisionStatus::Redacted => self.redacted += 1,
            DecisionStatus::Blocked => self.blocked += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.allowed + self.redacted + self.blocked
    }
}

/// Optional breakdown attached to a summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Breakdown {
    /// Status counts per agent; records without an agent count as `unknown`
    ByAgent(BTreeMap<String, StatusTally>),
    ByStatus(StatusTally),
}

/// Aggregate counts over a time window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total: u64,
    pub allowed: u64,
    pub redacted: u64,
    pub blocked: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Breakdown>,
}

pub const UNKNOWN_AGENT: &str = "unknown";

/// Aggregate records matching the query's time window
pub fn aggregate<'a, I>(records: I, query: &MetricsQuery) -> MetricsSummary
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut tally = StatusTally::default();
    let mut by_agent: BTreeMap<String, StatusTally> = BTreeMap::new();

    for record in records.into_iter().filter(|r| query.contains(r.timestamp)) {
        tally.add(record.status);
        if query.group_by == Some(GroupBy::AgentId) {
            let agent = record.agent_id.as_deref().unwrap_or(UNKNOWN_AGENT);
            by_agent.entry(agent.to_string()).or_default().add(record.status);
        }
    }

    let group_by = query.group_by.map(|g| match g {
        GroupBy::AgentId => Breakdown::ByAgent(by_agent),
        GroupBy::Status => Breakdown::ByStatus(tally),
    });

    MetricsSummary {
        total: tally.total(),
        allowed: tally.allowed,
        redacted: tally.redacted,
        blocked: tally.blocked,
        group_by,
    }
}

/// Most recent matching records first, at most `query.limit`. `records`
/// must be in insertion order; equal timestamps come out last-inserted first.
pub fn recent<I>(records: I, query: &LogQuery) -> Vec<LogRecord>
where
    I: IntoIterator<Item = LogRecord>,
{
    let mut matching: Vec<LogRecord> = records.into_iter().filter(|r| query.matches(r)).collect();
    matching.reverse();
    matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    matching.truncate(query.limit);
    matching
}
