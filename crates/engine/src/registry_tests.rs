// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn noop_do(id: &str, caps: &[&str]) -> AgentSpec {
    AgentSpec::do_agent(
        id,
        caps.iter().map(|c| Capability::named(*c)).collect(),
        |_ctx, _want| async { Ok(()) },
    )
}

#[test]
fn first_registered_provider_wins() -> anyhow::Result<()> {
    let registry = AgentRegistry::new();
    registry.register(noop_do("mailer-a", &["send-mail"]))?;
    registry.register(noop_do("mailer-b", &["send-mail"]))?;

    let resolved = registry.resolve("send-mail").map(|a| a.id.clone());
    assert_eq!(resolved.as_deref(), Some("mailer-a"));
    assert_eq!(registry.providers("send-mail").len(), 2);
    Ok(())
}

#[test]
fn exact_agent_id_overrides_capability_lookup() -> anyhow::Result<()> {
    let registry = AgentRegistry::new();
    registry.register(noop_do("mailer-a", &["send-mail"]))?;
    registry.register(noop_do("mailer-b", &["send-mail"]))?;

    let resolved = registry.resolve("mailer-b").map(|a| a.id.clone());
    assert_eq!(resolved.as_deref(), Some("mailer-b"));
    Ok(())
}

#[test]
fn duplicate_agent_ids_are_rejected() -> anyhow::Result<()> {
    let registry = AgentRegistry::new();
    registry.register(noop_do("solo", &["a"]))?;
    assert!(registry.register(noop_do("solo", &["b"])).is_err());
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[test]
fn unknown_requirements_resolve_to_none() {
    let registry = AgentRegistry::new();
    assert!(registry.resolve("anything").is_none());
    assert!(registry.providers("anything").is_empty());
    assert!(registry.is_empty());
}

#[test]
fn registration_index_tracks_insertion_order() -> anyhow::Result<()> {
    let registry = AgentRegistry::new();
    registry.register(noop_do("first", &["a"]))?;
    registry.register(noop_do("second", &["b"]))?;

    assert_eq!(registry.registration_index("first"), Some(0));
    assert_eq!(registry.registration_index("second"), Some(1));
    assert_eq!(registry.registration_index("ghost"), None);
    Ok(())
}

#[test]
fn capability_keywords_survive_registration() -> anyhow::Result<()> {
    let registry = AgentRegistry::new();
    let spec = AgentSpec::do_agent(
        "finder",
        vec![Capability::with_keywords("search", &["flight", "hotel"])],
        |_ctx, _want| async { Ok(()) },
    );
    registry.register(spec)?;

    let agent = registry.agent("finder");
    let keywords = agent.map(|a| a.capabilities[0].keywords.clone()).unwrap_or_default();
    assert_eq!(keywords, vec!["flight".to_owned(), "hotel".to_owned()]);
    Ok(())
}
