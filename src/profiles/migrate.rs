//! Versioned load of the profile document.
//!
//! Early releases persisted a bare array of profiles where context conditions
//! lived in per-profile convenience fields: an SSID allow-list, a single
//! post-mount script and a single Wake-on-LAN target. Those shapes fold into
//! the generalized rules/automations here and the legacy fields are dropped
//! on the next write. The engine's runtime data model never sees them.

use serde_json::{Value, json};

use super::store::{DOCUMENT_VERSION, ProfileDocument};

/// Upgrade a raw document value to the current shape. Returns the parsed
/// document and whether a legacy shape was upgraded.
pub(crate) fn upgrade_document(value: Value) -> Result<(ProfileDocument, bool), serde_json::Error> {
    match value {
        // Legacy layout: a bare array of profiles
        Value::Array(entries) => {
            let profiles: Vec<Value> = entries.into_iter().map(upgrade_profile).collect();
            let document = serde_json::from_value(json!({
                "version": DOCUMENT_VERSION,
                "profiles": profiles,
            }))?;
            Ok((document, true))
        }
        other => Ok((serde_json::from_value(other)?, false)),
    }
}

fn upgrade_profile(mut value: Value) -> Value {
    let Some(obj) = value.as_object_mut() else {
        return value;
    };

    // SSID allow-list: any listed network was allowed to mount
    if let Some(ssids) = obj.remove("ssids") {
        let rules: Vec<Value> = ssids
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                entry.as_str().map(|ssid| {
                    json!({
                        "type": "wifi",
                        "operator": "equals",
                        "value": ssid,
                    })
                })
            })
            .collect();
        if !rules.is_empty() {
            obj.insert("rules".to_string(), Value::Array(rules));
            obj.insert("ruleLogic".to_string(), json!("any"));
        }
    }

    let mut automations: Vec<Value> = obj
        .get("automations")
        .and_then(|a| a.as_array().cloned())
        .unwrap_or_default();

    // Single post-mount script
    if let Some(script) = obj.remove("script")
        && let Some(path) = script.get("path").and_then(|p| p.as_str())
    {
        automations.push(json!({
            "type": "shell",
            "enabled": script.get("enabled").and_then(|e| e.as_bool()).unwrap_or(true),
            "events": ["mounted"],
            "path": path,
            "arguments": script.get("arguments").cloned().unwrap_or(Value::Null),
        }));
    }

    // Single Wake-on-LAN target, fired before mounting
    if let Some(wol) = obj.remove("wol")
        && let Some(mac) = wol.get("macAddress").and_then(|m| m.as_str())
    {
        automations.push(json!({
            "type": "wol",
            "enabled": wol.get("enabled").and_then(|e| e.as_bool()).unwrap_or(true),
            "events": ["preMount"],
            "macAddress": mac,
            "broadcastAddress": wol.get("broadcastAddress").cloned().unwrap_or(Value::Null),
            "port": wol.get("port").cloned().unwrap_or(Value::Null),
            "waitTime": wol.get("waitTime").cloned().unwrap_or(json!(0.0)),
        }));
    }

    if !automations.is_empty() {
        obj.insert("automations".to_string(), Value::Array(automations));
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::{AutomationKind, LifecycleEvent, RuleKind, RuleLogic, RuleOperator};

    #[test]
    fn test_current_document_passes_through() {
        let value = json!({
            "version": DOCUMENT_VERSION,
            "profiles": [{
                "id": "9a9e0e42-5a13-4e99-b6a8-1f5f1e6b9a01",
                "name": "NAS",
                "url": "smb://nas.local/media",
            }],
        });

        let (document, upgraded) = upgrade_document(value).unwrap();
        assert!(!upgraded);
        assert_eq!(document.profiles.len(), 1);
        assert_eq!(document.profiles[0].name, "NAS");
    }

    #[test]
    fn test_legacy_ssid_list_becomes_wifi_rules() {
        let value = json!([{
            "id": "9a9e0e42-5a13-4e99-b6a8-1f5f1e6b9a01",
            "name": "NAS",
            "url": "smb://nas.local/media",
            "ssids": ["Home", "Home-5G"],
        }]);

        let (document, upgraded) = upgrade_document(value).unwrap();
        assert!(upgraded);

        let profile = &document.profiles[0];
        assert_eq!(profile.rule_logic, RuleLogic::Any);
        assert_eq!(profile.rules.len(), 2);
        for rule in &profile.rules {
            assert_eq!(rule.kind, RuleKind::Wifi);
            assert_eq!(rule.operator, RuleOperator::Equals);
        }
        assert_eq!(profile.rules[0].value, "Home");
        assert_eq!(profile.rules[1].value, "Home-5G");
    }

    #[test]
    fn test_legacy_script_and_wol_become_automations() {
        let value = json!([{
            "id": "9a9e0e42-5a13-4e99-b6a8-1f5f1e6b9a01",
            "name": "NAS",
            "url": "smb://nas.local/media",
            "script": {
                "path": "/usr/local/bin/after-mount",
                "arguments": "--fast",
            },
            "wol": {
                "macAddress": "AA:BB:CC:DD:EE:FF",
                "broadcastAddress": "192.168.1.255",
                "port": 9,
                "waitTime": 3.0,
            },
        }]);

        let (document, upgraded) = upgrade_document(value).unwrap();
        assert!(upgraded);

        let automations = &document.profiles[0].automations;
        assert_eq!(automations.len(), 2);

        assert_eq!(automations[0].kind, AutomationKind::Shell);
        assert!(automations[0].enabled);
        assert_eq!(automations[0].events, vec![LifecycleEvent::Mounted]);
        assert_eq!(automations[0].path.as_deref(), Some("/usr/local/bin/after-mount"));
        assert_eq!(automations[0].arguments.as_deref(), Some("--fast"));

        assert_eq!(automations[1].kind, AutomationKind::Wol);
        assert_eq!(automations[1].events, vec![LifecycleEvent::PreMount]);
        assert_eq!(automations[1].mac_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(automations[1].wait_time, 3.0);
    }

    #[test]
    fn test_legacy_profile_without_extras_upgrades_clean() {
        let value = json!([{
            "id": "9a9e0e42-5a13-4e99-b6a8-1f5f1e6b9a01",
            "name": "Plain",
            "url": "nfs://nas.local/export",
        }]);

        let (document, upgraded) = upgrade_document(value).unwrap();
        assert!(upgraded);
        assert!(document.profiles[0].rules.is_empty());
        assert!(document.profiles[0].automations.is_empty());
    }
}
