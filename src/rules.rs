//! Rule evaluation against the live system context.
//!
//! Pure decision logic: the caller pre-fetches the context snapshot, this
//! module only compares. No I/O happens here.

use crate::profiles::{MountProfile, MountRule, RuleKind, RuleLogic, RuleOperator};

/// Snapshot of the system state rules are evaluated against
#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    /// SSID of the currently associated Wi-Fi network, if any
    pub ssid: Option<String>,
    /// Names of running applications/processes
    pub running_apps: Vec<String>,
    /// Names of active VPN-class network interfaces
    pub vpn_interfaces: Vec<String>,
}

/// Decide whether a profile should be mounted under the given context.
///
/// A profile without rules is always eligible.
pub fn evaluate(profile: &MountProfile, ctx: &RuleContext) -> bool {
    if profile.rules.is_empty() {
        return true;
    }

    let mut results = profile.rules.iter().map(|rule| evaluate_rule(rule, ctx));
    match profile.rule_logic {
        RuleLogic::All => results.all(|matched| matched),
        RuleLogic::Any => results.any(|matched| matched),
    }
}

fn evaluate_rule(rule: &MountRule, ctx: &RuleContext) -> bool {
    match rule.kind {
        RuleKind::Wifi => evaluate_wifi(rule, ctx.ssid.as_deref()),
        RuleKind::App => evaluate_app(rule, &ctx.running_apps),
        RuleKind::Vpn => evaluate_vpn(rule, &ctx.vpn_interfaces),
    }
}

fn evaluate_wifi(rule: &MountRule, ssid: Option<&str>) -> bool {
    // No association at all: only "is not X" can hold
    let Some(ssid) = ssid else {
        return rule.operator == RuleOperator::NotEquals;
    };

    match rule.operator {
        RuleOperator::Equals => ssid == rule.value,
        RuleOperator::NotEquals => ssid != rule.value,
        RuleOperator::Contains => ssid.contains(&rule.value),
    }
}

fn evaluate_app(rule: &MountRule, running_apps: &[String]) -> bool {
    let needle = rule.value.to_lowercase();
    let running = running_apps.iter().any(|app| {
        let app = app.to_lowercase();
        match rule.operator {
            RuleOperator::Contains => app.contains(&needle),
            // NotEquals negates the "is running" check below, the per-entry
            // comparison stays an exact match
            RuleOperator::Equals | RuleOperator::NotEquals => app == needle,
        }
    });

    match rule.operator {
        RuleOperator::NotEquals => !running,
        _ => running,
    }
}

fn evaluate_vpn(rule: &MountRule, vpn_interfaces: &[String]) -> bool {
    // Empty value is a pure connectivity check
    if rule.value.is_empty() {
        let connected = !vpn_interfaces.is_empty();
        return match rule.operator {
            RuleOperator::NotEquals => !connected,
            _ => connected,
        };
    }

    let needle = rule.value.to_lowercase();
    let matched = vpn_interfaces.iter().any(|iface| {
        let iface = iface.to_lowercase();
        match rule.operator {
            RuleOperator::Contains => iface.contains(&needle),
            RuleOperator::Equals | RuleOperator::NotEquals => iface == needle,
        }
    });

    match rule.operator {
        RuleOperator::NotEquals => !matched,
        _ => matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::MountProfile;

    fn profile_with(rules: Vec<MountRule>, logic: RuleLogic) -> MountProfile {
        let mut profile = MountProfile::new("test", "smb://nas.local/share");
        profile.rules = rules;
        profile.rule_logic = logic;
        profile
    }

    fn ctx(ssid: Option<&str>, apps: &[&str], vpns: &[&str]) -> RuleContext {
        RuleContext {
            ssid: ssid.map(str::to_string),
            running_apps: apps.iter().map(|s| s.to_string()).collect(),
            vpn_interfaces: vpns.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_rules_always_eligible() {
        let profile = profile_with(vec![], RuleLogic::All);
        assert!(evaluate(&profile, &ctx(None, &[], &[])));
        assert!(evaluate(&profile, &ctx(Some("Anywhere"), &["x"], &["utun0"])));
    }

    #[test]
    fn test_wifi_equals() {
        let profile = profile_with(
            vec![MountRule::new(RuleKind::Wifi, RuleOperator::Equals, "Home")],
            RuleLogic::All,
        );
        assert!(evaluate(&profile, &ctx(Some("Home"), &[], &[])));
        assert!(!evaluate(&profile, &ctx(Some("Office"), &[], &[])));
        // Absence of any SSID only satisfies NotEquals
        assert!(!evaluate(&profile, &ctx(None, &[], &[])));
    }

    #[test]
    fn test_wifi_not_equals_without_ssid() {
        let profile = profile_with(
            vec![MountRule::new(
                RuleKind::Wifi,
                RuleOperator::NotEquals,
                "CoffeeShop",
            )],
            RuleLogic::All,
        );
        assert!(evaluate(&profile, &ctx(None, &[], &[])));
        assert!(evaluate(&profile, &ctx(Some("Home"), &[], &[])));
        assert!(!evaluate(&profile, &ctx(Some("CoffeeShop"), &[], &[])));
    }

    #[test]
    fn test_wifi_contains_is_case_sensitive() {
        let profile = profile_with(
            vec![MountRule::new(RuleKind::Wifi, RuleOperator::Contains, "Home")],
            RuleLogic::All,
        );
        assert!(evaluate(&profile, &ctx(Some("Home-5G"), &[], &[])));
        assert!(!evaluate(&profile, &ctx(Some("home-5g"), &[], &[])));
    }

    #[test]
    fn test_app_matching_is_case_insensitive() {
        let equals = profile_with(
            vec![MountRule::new(RuleKind::App, RuleOperator::Equals, "plex")],
            RuleLogic::All,
        );
        assert!(evaluate(&equals, &ctx(None, &["Plex"], &[])));
        assert!(!evaluate(&equals, &ctx(None, &["Plexamp"], &[])));

        let contains = profile_with(
            vec![MountRule::new(RuleKind::App, RuleOperator::Contains, "plex")],
            RuleLogic::All,
        );
        assert!(evaluate(&contains, &ctx(None, &["Plexamp"], &[])));
    }

    #[test]
    fn test_app_not_equals_negates_running() {
        let profile = profile_with(
            vec![MountRule::new(
                RuleKind::App,
                RuleOperator::NotEquals,
                "Backup Agent",
            )],
            RuleLogic::All,
        );
        assert!(evaluate(&profile, &ctx(None, &["Finder"], &[])));
        assert!(!evaluate(&profile, &ctx(None, &["backup agent"], &[])));
    }

    #[test]
    fn test_vpn_connectivity_check_with_empty_value() {
        let connected = profile_with(
            vec![MountRule::new(RuleKind::Vpn, RuleOperator::Equals, "")],
            RuleLogic::All,
        );
        assert!(evaluate(&connected, &ctx(None, &[], &["utun4"])));
        assert!(!evaluate(&connected, &ctx(None, &[], &[])));

        let disconnected = profile_with(
            vec![MountRule::new(RuleKind::Vpn, RuleOperator::NotEquals, "")],
            RuleLogic::All,
        );
        assert!(evaluate(&disconnected, &ctx(None, &[], &[])));
        assert!(!evaluate(&disconnected, &ctx(None, &[], &["wg0"])));
    }

    #[test]
    fn test_vpn_named_interface() {
        let profile = profile_with(
            vec![MountRule::new(RuleKind::Vpn, RuleOperator::Equals, "WG0")],
            RuleLogic::All,
        );
        assert!(evaluate(&profile, &ctx(None, &[], &["wg0"])));
        assert!(!evaluate(&profile, &ctx(None, &[], &["utun4"])));

        // Not connected at all: NotEquals is vacuously true
        let not_on = profile_with(
            vec![MountRule::new(RuleKind::Vpn, RuleOperator::NotEquals, "wg0")],
            RuleLogic::All,
        );
        assert!(evaluate(&not_on, &ctx(None, &[], &[])));
    }

    #[test]
    fn test_all_logic_requires_every_rule() {
        let profile = profile_with(
            vec![
                MountRule::new(RuleKind::Wifi, RuleOperator::Equals, "Home"),
                MountRule::new(RuleKind::Vpn, RuleOperator::Equals, ""),
            ],
            RuleLogic::All,
        );
        assert!(evaluate(&profile, &ctx(Some("Home"), &[], &["utun4"])));
        assert!(!evaluate(&profile, &ctx(Some("Home"), &[], &[])));
        assert!(!evaluate(&profile, &ctx(Some("Office"), &[], &["utun4"])));
    }

    #[test]
    fn test_any_logic_needs_one_rule() {
        let profile = profile_with(
            vec![
                MountRule::new(RuleKind::Wifi, RuleOperator::Equals, "Home"),
                MountRule::new(RuleKind::Vpn, RuleOperator::Equals, ""),
            ],
            RuleLogic::Any,
        );
        assert!(evaluate(&profile, &ctx(Some("Office"), &[], &["utun4"])));
        assert!(evaluate(&profile, &ctx(Some("Home"), &[], &[])));
        assert!(!evaluate(&profile, &ctx(Some("Office"), &[], &[])));
    }
}
