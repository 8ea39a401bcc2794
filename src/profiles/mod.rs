pub mod migrate;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use store::{ProfileStore, StoreError};

/// What a rule inspects in the live system context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Wifi,
    Vpn,
    App,
}

/// How a rule's value is compared against the observed context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RuleOperator {
    Equals,
    NotEquals,
    Contains,
}

/// Combinator applied across a profile's rules
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleLogic {
    #[default]
    All,
    Any,
}

/// A single mount condition, evaluated against live context and never persisted
/// as state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MountRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    pub operator: RuleOperator,
    pub value: String,
}

impl MountRule {
    pub fn new(kind: RuleKind, operator: RuleOperator, value: impl Into<String>) -> Self {
        Self {
            kind,
            operator,
            value: value.into(),
        }
    }
}

/// Kind of side-effect task an automation runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutomationKind {
    Shell,
    App,
    Wol,
}

/// Lifecycle points an automation can be bound to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleEvent {
    PreMount,
    Mounted,
    PreUnmount,
    Unmounted,
    MountFailed,
}

/// A side-effect task bound to one or more lifecycle events of its profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutomationConfig {
    #[serde(rename = "type")]
    pub kind: AutomationKind,

    pub enabled: bool,

    /// Events this task fires on, in no particular order
    pub events: Vec<LifecycleEvent>,

    /// Executable or application path (shell/app tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Whitespace-separated argument string (shell tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    /// Target MAC in colon-hex notation (wol tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,

    /// Broadcast destination for the magic packet (wol tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_address: Option<String>,

    /// UDP port for the magic packet (wol tasks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Seconds to pause after this task before the next one runs
    #[serde(default)]
    pub wait_time: f64,
}

impl AutomationConfig {
    /// Whether this task should run for the given event
    pub fn applies_to(&self, event: LifecycleEvent) -> bool {
        self.enabled && self.events.contains(&event)
    }
}

/// A user-configured network share target with its mount, rule and automation
/// settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MountProfile {
    /// Unique identifier for the profile
    pub id: Uuid,

    /// Human-readable name shown in listings
    pub name: String,

    /// Connection target, e.g. `smb://user@nas.local:445/media`
    pub url: String,

    /// Local mount point override; the provider picks one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_point: Option<String>,

    /// Master switch; a disabled profile is never touched by the engine
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,

    /// Opt-in to the rule-driven auto-mount sweep
    #[serde(default)]
    pub auto_mount: bool,

    #[serde(default)]
    pub rules: Vec<MountRule>,

    #[serde(default)]
    pub rule_logic: RuleLogic,

    /// Bonjour hostname whose resolved IP is tracked into `url`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bonjour_hostname: Option<String>,

    #[serde(default)]
    pub automations: Vec<AutomationConfig>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl MountProfile {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            mount_point: None,
            is_enabled: true,
            auto_mount: false,
            rules: Vec::new(),
            rule_logic: RuleLogic::default(),
            bonjour_hostname: None,
            automations: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
