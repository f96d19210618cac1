//! Three-way diff between an old and new set of upstream descriptors
//! (spec §4.1 `reload`, §4.6 diff algorithm).

use super::descriptor::UpstreamDescriptor;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modified {
    pub name: String,
    /// Field-level change list so callers can skip transport recreation
    /// when only cosmetic fields (tags, description) changed.
    pub fields_changed: Vec<String>,
    pub transport_affecting: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<Modified>,
    pub unchanged: Vec<String>,
}

fn changed_fields(old: &UpstreamDescriptor, new: &UpstreamDescriptor) -> Vec<String> {
    let mut fields = Vec::new();
    macro_rules! check {
        ($field:ident) => {
            if old.$field != new.$field {
                fields.push(stringify!($field).to_string());
            }
        };
    }
    check!(transport_type);
    check!(command);
    check!(args);
    check!(env);
    check!(cwd);
    check!(restart_on_exit);
    check!(max_restarts);
    check!(restart_delay_ms);
    check!(url);
    check!(headers);
    check!(oauth_provider);
    check!(tags);
    check!(disabled);
    check!(timeout_ms);
    check!(connection_timeout_ms);
    check!(request_timeout_ms);
    fields
}

pub fn diff_descriptors(
    old: &HashMap<String, UpstreamDescriptor>,
    new: &HashMap<String, UpstreamDescriptor>,
) -> ConfigDiff {
    let mut out = ConfigDiff::default();

    for name in old.keys() {
        if !new.contains_key(name) {
            out.removed.push(name.clone());
        }
    }

    for (name, new_desc) in new {
        match old.get(name) {
            None => out.added.push(name.clone()),
            Some(old_desc) => {
                let fields = changed_fields(old_desc, new_desc);
                if fields.is_empty() {
                    out.unchanged.push(name.clone());
                } else {
                    let transport_affecting = old_desc.transport_affecting_fields_changed(new_desc);
                    out.modified.push(Modified {
                        name: name.clone(),
                        fields_changed: fields,
                        transport_affecting,
                    });
                }
            }
        }
    }

    out.added.sort();
    out.removed.sort();
    out.modified.sort_by(|a, b| a.name.cmp(&b.name));
    out.unchanged.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::descriptor::TransportKind;

    fn stdio(name: &str, cmd: &str) -> UpstreamDescriptor {
        UpstreamDescriptor {
            name: name.to_string(),
            transport_type: Some(TransportKind::Stdio),
            command: Some(cmd.to_string()),
            args: None,
            env: None,
            cwd: None,
            restart_on_exit: false,
            max_restarts: 5,
            restart_delay_ms: 1000,
            url: None,
            headers: None,
            oauth_provider: None,
            tags: vec![],
            disabled: false,
            timeout_ms: None,
            connection_timeout_ms: None,
            request_timeout_ms: None,
        }
    }

    #[test]
    fn detects_added_removed_modified_unchanged() {
        let mut old = HashMap::new();
        old.insert("a".to_string(), stdio("a", "echo"));
        old.insert("b".to_string(), stdio("b", "cat"));

        let mut new = HashMap::new();
        new.insert("a".to_string(), stdio("a", "echo")); // unchanged
        new.insert("b".to_string(), stdio("b", "tac")); // modified (transport-affecting)
        new.insert("c".to_string(), stdio("c", "grep")); // added
        // "b" present, "a" present, old "b" removed implicitly by nothing — wait old has a,b; new has a,b,c -> nothing removed

        let diff = diff_descriptors(&old, &new);
        assert_eq!(diff.added, vec!["c".to_string()]);
        assert!(diff.removed.is_empty());
        assert_eq!(diff.unchanged, vec!["a".to_string()]);
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].name, "b");
        assert!(diff.modified[0].transport_affecting);
    }

    #[test]
    fn cosmetic_change_is_not_transport_affecting() {
        let mut old_d = stdio("a", "echo");
        old_d.tags = vec!["x".into()];
        let mut new_d = stdio("a", "echo");
        new_d.tags = vec!["y".into()];

        let mut old = HashMap::new();
        old.insert("a".to_string(), old_d);
        let mut new = HashMap::new();
        new.insert("a".to_string(), new_d);

        let diff = diff_descriptors(&old, &new);
        assert_eq!(diff.modified.len(), 1);
        assert!(!diff.modified[0].transport_affecting);
        assert_eq!(diff.modified[0].fields_changed, vec!["tags".to_string()]);
    }

    #[test]
    fn removed_detected() {
        let mut old = HashMap::new();
        old.insert("a".to_string(), stdio("a", "echo"));
        let new: HashMap<String, UpstreamDescriptor> = HashMap::new();
        let diff = diff_descriptors(&old, &new);
        assert_eq!(diff.removed, vec!["a".to_string()]);
    }
}
