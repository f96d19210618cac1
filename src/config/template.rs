//! Server template rendering (spec §9): substituting `{{project}}`,
//! `{{user}}`, and `{{environment}}` placeholders in a [`ServerTemplate`]'s
//! string fields with values carried on the inbound session that asked for
//! it.

use super::app::ServerTemplate;
use super::descriptor::UpstreamDescriptor;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Per-session values substituted into a template at render time. A field
/// left `None` renders its placeholder as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub project: Option<String>,
    pub user: Option<String>,
    pub environment: Option<String>,
}

impl SessionContext {
    pub fn is_empty(&self) -> bool {
        self.project.is_none() && self.user.is_none() && self.environment.is_none()
    }

    fn render(&self, input: &str) -> String {
        if !input.contains("{{") {
            return input.to_string();
        }
        input
            .replace("{{project}}", self.project.as_deref().unwrap_or(""))
            .replace("{{user}}", self.user.as_deref().unwrap_or(""))
            .replace("{{environment}}", self.environment.as_deref().unwrap_or(""))
    }
}

/// Render every placeholder-bearing field of `template` against `context`,
/// producing a concrete [`UpstreamDescriptor`] ready to connect. The
/// descriptor's `name` is left as the template's own name; callers key the
/// resulting connection by hash or session id (spec §9), not by this name.
pub fn render_descriptor(template: &ServerTemplate, context: &SessionContext) -> UpstreamDescriptor {
    let mut descriptor = template.descriptor.clone();

    descriptor.command = descriptor.command.as_deref().map(|s| context.render(s));
    descriptor.cwd = descriptor.cwd.as_deref().map(|s| context.render(s));
    descriptor.url = descriptor.url.as_deref().map(|s| context.render(s));

    if let Some(args) = &descriptor.args {
        descriptor.args = Some(args.iter().map(|a| context.render(a)).collect());
    }
    if let Some(env) = &descriptor.env {
        descriptor.env = Some(env.iter().map(|(k, v)| (k.clone(), context.render(v))).collect());
    }
    if let Some(headers) = &descriptor.headers {
        descriptor.headers = Some(headers.iter().map(|(k, v)| (k.clone(), context.render(v))).collect());
    }

    descriptor
}

/// Stable hash of a rendered descriptor, used as the shared portion of a
/// shareable template's connection key (spec §9: `name:<hash>`). Two
/// sessions whose context renders to the same descriptor get the same hash
/// and therefore the same upstream instance.
pub fn render_hash(descriptor: &UpstreamDescriptor) -> u64 {
    let mut hasher = DefaultHasher::new();
    descriptor.command.hash(&mut hasher);
    descriptor.args.hash(&mut hasher);
    descriptor.cwd.hash(&mut hasher);
    descriptor.url.hash(&mut hasher);
    if let Some(env) = &descriptor.env {
        let mut pairs: Vec<_> = env.iter().collect();
        pairs.sort();
        pairs.hash(&mut hasher);
    }
    if let Some(headers) = &descriptor.headers {
        let mut pairs: Vec<_> = headers.iter().collect();
        pairs.sort();
        pairs.hash(&mut hasher);
    }
    hasher.finish()
}

/// The connection key a rendered template instance is stored under (spec
/// §9): `name:<hash>` when shareable, `name:<session-id>` otherwise.
pub fn connection_key(template_name: &str, template: &ServerTemplate, rendered: &UpstreamDescriptor, session_id: &str) -> String {
    if template.shareable {
        format!("{}:{:016x}", template_name, render_hash(rendered))
    } else {
        format!("{}:{}", template_name, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::descriptor::TransportKind;

    fn template(shareable: bool) -> ServerTemplate {
        ServerTemplate {
            descriptor: UpstreamDescriptor {
                name: "workspace".into(),
                transport_type: Some(TransportKind::Stdio),
                command: Some("/bin/workspace-server".into()),
                args: Some(vec!["--project".into(), "{{project}}".into(), "--user".into(), "{{user}}".into()]),
                env: Some([("ENVIRONMENT".to_string(), "{{environment}}".to_string())].into_iter().collect()),
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
            },
            shareable,
        }
    }

    #[test]
    fn renders_placeholders_in_args_and_env() {
        let ctx = SessionContext { project: Some("acme".into()), user: Some("ada".into()), environment: Some("prod".into()) };
        let rendered = render_descriptor(&template(true), &ctx);
        assert_eq!(rendered.args.unwrap(), vec!["--project", "acme", "--user", "ada"]);
        assert_eq!(rendered.env.unwrap().get("ENVIRONMENT").unwrap(), "prod");
    }

    #[test]
    fn missing_context_fields_render_as_empty_string() {
        let ctx = SessionContext::default();
        let rendered = render_descriptor(&template(true), &ctx);
        assert_eq!(rendered.args.unwrap(), vec!["--project", "", "--user", ""]);
    }

    #[test]
    fn identical_renders_produce_the_same_hash() {
        let ctx_a = SessionContext { project: Some("acme".into()), user: None, environment: None };
        let ctx_b = SessionContext { project: Some("acme".into()), user: None, environment: None };
        let a = render_descriptor(&template(true), &ctx_a);
        let b = render_descriptor(&template(true), &ctx_b);
        assert_eq!(render_hash(&a), render_hash(&b));
    }

    #[test]
    fn different_context_produces_a_different_hash() {
        let ctx_a = SessionContext { project: Some("acme".into()), ..Default::default() };
        let ctx_b = SessionContext { project: Some("globex".into()), ..Default::default() };
        let a = render_descriptor(&template(true), &ctx_a);
        let b = render_descriptor(&template(true), &ctx_b);
        assert_ne!(render_hash(&a), render_hash(&b));
    }

    #[test]
    fn shareable_key_is_name_and_hash_private_key_is_name_and_session() {
        let ctx = SessionContext { project: Some("acme".into()), ..Default::default() };
        let shared_tmpl = template(true);
        let rendered = render_descriptor(&shared_tmpl, &ctx);
        let shared_key = connection_key("workspace", &shared_tmpl, &rendered, "session-1");
        assert_eq!(shared_key, format!("workspace:{:016x}", render_hash(&rendered)));

        let private_tmpl = template(false);
        let private_key = connection_key("workspace", &private_tmpl, &rendered, "session-1");
        assert_eq!(private_key, "workspace:session-1");
    }
}
